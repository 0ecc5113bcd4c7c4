/***
SIMPROF: simulation of ribosome profiling experiments
    Copyright (C) 2025 Andrew T. Martens

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License, version 3,
    as published by the Free Software Foundation.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

e-mail: simplton@logical.bio
***/

/* rates.rs: per-codon mean dwell times, and the rules for perturbing them. */

use crate::codons::{Codon, NUM_CODONS};
use crate::errors::{SimResult, SimulationError};

/// Stop codons never draw an elongation time (reaching the last codon means
/// runoff), so they only need a placeholder.
pub const STOP_CODON_MEAN: f64 = 1.0;

/// Multiplier for the fixed codon permutation used by the shuffle rule.
/// Coprime with 64, so i -> (i * 163) mod 64 is a bijection.
const SHUFFLE_MULTIPLIER: usize = 163;

/// Codon inverted by `change_one` when no codon is named.
pub const DEFAULT_CHANGED_CODON: &str = "CGA";

fn check_mean(codon: Codon, mean: f64) -> SimResult<()> {
    if mean.is_finite() && mean > 0.0 {
	Ok(())
    } else {
	Err(SimulationError::InvalidRate { codon: codon.to_string(), mean })
    }
}

/// Mean dwell time for every one of the 64 codons.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    means: [f64; NUM_CODONS],
}

impl RateTable {
    /// Build a table that must cover all 64 codons. A codon given twice keeps
    /// its last value.
    pub fn from_means<I>(entries: I) -> SimResult<RateTable>
    where
	I: IntoIterator<Item = (Codon, f64)>,
    {
	let mut means: [Option<f64>; NUM_CODONS] = [None; NUM_CODONS];
	for (codon, mean) in entries {
	    check_mean(codon, mean)?;
	    means[codon.index()] = Some(mean);
	}

	let mut table = [0.0; NUM_CODONS];
	for codon in Codon::all() {
	    table[codon.index()] = means[codon.index()]
		.ok_or_else(|| SimulationError::MissingRate(codon.to_string()))?;
	}
	Ok(RateTable { means: table })
    }

    /// Like `from_means`, but the three stop codons fall back to
    /// `STOP_CODON_MEAN` when absent.
    pub fn from_non_stop_means<I>(entries: I) -> SimResult<RateTable>
    where
	I: IntoIterator<Item = (Codon, f64)>,
    {
	let given: Vec<(Codon, f64)> = entries.into_iter().collect();
	let stops = Codon::all()
	    .filter(|c| c.is_stop())
	    .filter(|c| !given.iter().any(|(g, _)| g == c))
	    .map(|c| (c, STOP_CODON_MEAN));

	// Explicit entries go last so they win over the stop-codon defaults.
	let all: Vec<(Codon, f64)> = stops.chain(given.iter().copied()).collect();
	RateTable::from_means(all)
    }

    #[cfg(test)]
    pub fn uniform(mean: f64) -> SimResult<RateTable> {
	RateTable::from_means(Codon::all().map(|c| (c, mean)))
    }

    #[inline(always)]
    pub fn mean_dwell(&self, codon: Codon) -> f64 {
	self.means[codon.index()]
    }

    pub fn means(&self) -> &[f64; NUM_CODONS] {
	&self.means
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (Codon, f64)> + '_ {
	Codon::all().map(move |c| (c, self.means[c.index()]))
    }
}

/// A named rule for changing elongation kinetics mid-run.
#[derive(Debug, Clone, PartialEq)]
pub enum Perturbation {
    /// Every mean becomes its reciprocal.
    Reciprocal,
    /// Means are permuted among codons by i -> (i * 163) mod 64.
    Shuffle,
    /// Every mean becomes 1.
    Uniform,
    /// Only this codon's mean is inverted.
    ChangeOne(Codon),
    /// The whole table is replaced.
    ChangeAll(RateTable),
}

impl Perturbation {
    /// Resolve a rule name. `change_all` takes its table from `replacement`,
    /// and `change_one` accepts an optional `:CODON` suffix.
    pub fn parse(name: &str, replacement: Option<RateTable>) -> SimResult<Perturbation> {
	let (rule, argument) = match name.split_once(':') {
	    Some((rule, argument)) => (rule, Some(argument)),
	    None => (name, None),
	};
	let perturbation = match (rule.trim(), argument) {
	    ("reciprocal", None) => Perturbation::Reciprocal,
	    ("shuffle", None) => Perturbation::Shuffle,
	    ("uniform", None) => Perturbation::Uniform,
	    ("change_one" | "changeOne", None) => {
		Perturbation::ChangeOne(DEFAULT_CHANGED_CODON.parse()?)
	    }
	    ("change_one" | "changeOne", Some(codon)) => Perturbation::ChangeOne(codon.parse()?),
	    ("change_all" | "changeAll", None) => match replacement {
		Some(table) => Perturbation::ChangeAll(table),
		None => {
		    return Err(SimulationError::InvalidParameter(
			"change_all needs a second rate table".into(),
		    ));
		}
	    },
	    _ => return Err(SimulationError::UnknownPerturbation(name.to_string())),
	};

	Ok(perturbation)
    }

    pub fn name(&self) -> &'static str {
	match self {
	    Perturbation::Reciprocal => "reciprocal",
	    Perturbation::Shuffle => "shuffle",
	    Perturbation::Uniform => "uniform",
	    Perturbation::ChangeOne(_) => "change_one",
	    Perturbation::ChangeAll(_) => "change_all",
	}
    }

    pub fn apply(&self, baseline: &RateTable) -> RateTable {
	let old = baseline.means();
	let mut means = *old;
	match self {
	    Perturbation::Reciprocal => {
		for m in means.iter_mut() {
		    *m = 1.0 / *m;
		}
	    }
	    Perturbation::Shuffle => {
		for (i, m) in means.iter_mut().enumerate() {
		    *m = old[(i * SHUFFLE_MULTIPLIER) % NUM_CODONS];
		}
	    }
	    Perturbation::Uniform => means = [1.0; NUM_CODONS],
	    Perturbation::ChangeOne(codon) => {
		means[codon.index()] = 1.0 / old[codon.index()];
	    }
	    Perturbation::ChangeAll(table) => means = *table.means(),
	}
	RateTable { means }
    }
}
