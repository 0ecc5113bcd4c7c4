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

/* experiment.rs: turn real per-gene counts into synthetic ones, one gene at
a time. Genes share nothing, so callers may run them on separate threads as
long as each gets its own random source. */

use clap::ValueEnum;
use rand::Rng;
use rand_distr::{Binomial, Distribution};

use crate::codons::Codon;
use crate::errors::{SimResult, SimulationError};
use crate::message::{MessageParams, simulate_message};
use crate::rates::{Perturbation, RateTable};

/// Log progress every this many messages.
pub const PROGRESS_INTERVAL: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// Simulate ribosome traffic message by message.
    Mechanistic,
    /// Scatter the real total over codons in proportion to mean dwell time.
    Analytical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gene {
    pub name: String,
    /// Start codon through stop codon.
    pub codons: Vec<Codon>,
    /// Observed counts, indexed like `codons`.
    pub real_counts: Vec<f64>,
}

impl Gene {
    pub fn new(name: String, codons: Vec<Codon>, real_counts: Vec<f64>) -> SimResult<Gene> {
	if codons.len() != real_counts.len() {
	    return Err(SimulationError::InvalidParameter(format!(
		"{}: {} codons but {} counts",
		name,
		codons.len(),
		real_counts.len()
	    )));
	}
	if let Some(bad) = real_counts.iter().find(|c| !(c.is_finite() && **c >= 0.0)) {
	    return Err(SimulationError::InvalidParameter(format!(
		"{}: count {} is not a non-negative number",
		name, bad
	    )));
	}
	Ok(Gene { name, codons, real_counts })
    }

    pub fn total_real_counts(&self) -> f64 {
	self.real_counts.iter().sum()
    }

    /// Number of simulated footprints to collect for this gene.
    pub fn target(&self) -> u64 {
	self.total_real_counts().ceil() as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    /// Divided by a gene's translational efficiency to give its initiation mean.
    pub initiation_mean_numerator: f64,
    pub drug_mean: f64,
    /// None: drug runoff. Some: perturbed run.
    pub perturbation: Option<Perturbation>,
    pub method: Method,
    pub max_events: u64,
}

impl ExperimentConfig {
    pub fn validate(&self) -> SimResult<()> {
	if !(self.initiation_mean_numerator.is_finite() && self.initiation_mean_numerator > 0.0) {
	    return Err(SimulationError::InvalidParameter(format!(
		"initiation mean numerator must be positive, got {}",
		self.initiation_mean_numerator
	    )));
	}
	// TE 1 stands in for any gene; only the numerator is checked here.
	self.message_params(1.0)?.validate()
    }

    pub fn message_params(&self, te: f64) -> SimResult<MessageParams> {
	if !(te.is_finite() && te > 0.0) {
	    return Err(SimulationError::InvalidParameter(format!(
		"translational efficiency must be positive, got {}",
		te
	    )));
	}
	let params = MessageParams {
	    initiation_mean: self.initiation_mean_numerator / te,
	    drug_mean: self.drug_mean,
	    max_events: self.max_events,
	};
	params.validate()?;
	Ok(params)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedCounts {
    pub gene: String,
    /// Codon identity at each position.
    pub codons: Vec<Codon>,
    /// Per-codon counts, indexed like the gene's codons.
    pub counts: Vec<u64>,
    pub target: u64,
    /// Messages simulated to reach the target; zero for the analytical method.
    pub num_messages: u64,
}

impl SimulatedCounts {
    pub fn total(&self) -> u64 {
	self.counts.iter().sum()
    }
}

/// Simulate independent messages of `gene` until their pooled ribosome
/// positions reach the gene's target count. Any failed message fails the gene.
pub fn simulate_gene<R: Rng>(
    gene: &Gene,
    te: f64,
    rates: &RateTable,
    config: &ExperimentConfig,
    rng: &mut R,
) -> SimResult<SimulatedCounts> {
    let params = config.message_params(te)?;
    let target = gene.target();

    let mut counts = vec![0u64; gene.codons.len()];
    let mut total: u64 = 0;
    let mut num_messages: u64 = 0;

    while total < target {
	let sample = simulate_message(
	    &gene.codons,
	    rates,
	    params,
	    config.perturbation.as_ref(),
	    &mut *rng,
	)?;
	for position in sample {
	    counts[position] += 1;
	    total += 1;
	}
	num_messages += 1;

	if num_messages % PROGRESS_INTERVAL == 0 {
	    log::info!(
		"{} counts generated for {} from {} messages (target = {})",
		total, gene.name, num_messages, target
	    );
	}
    }

    log::info!(
	"{} counts generated for {} from {} messages",
	total, gene.name, num_messages
    );

    Ok(SimulatedCounts {
	gene: gene.name.clone(),
	codons: gene.codons.clone(),
	counts,
	target,
	num_messages,
    })
}

/// Binomial draw per codon: n is the real total (truncated), p the codon's
/// share of the gene's summed mean dwell times.
pub fn distribute_analytically<R: Rng>(
    gene: &Gene,
    rates: &RateTable,
    rng: &mut R,
) -> SimResult<SimulatedCounts> {
    let n = gene.total_real_counts().floor() as u64;
    let means: Vec<f64> = gene.codons.iter().map(|&c| rates.mean_dwell(c)).collect();
    let sum: f64 = means.iter().sum();

    let counts = means
	.iter()
	.map(|mean| {
	    // clamp: rounding can push the last fraction a hair above 1
	    let binomial = Binomial::new(n, (mean / sum).min(1.0))
		.map_err(|e| SimulationError::InvalidParameter(e.to_string()))?;
	    Ok(binomial.sample(&mut *rng))
	})
	.collect::<SimResult<Vec<u64>>>()?;

    Ok(SimulatedCounts {
	gene: gene.name.clone(),
	codons: gene.codons.clone(),
	counts,
	target: gene.target(),
	num_messages: 0,
    })
}

pub fn run_gene<R: Rng>(
    gene: &Gene,
    te: f64,
    rates: &RateTable,
    config: &ExperimentConfig,
    rng: &mut R,
) -> SimResult<SimulatedCounts> {
    log::info!("Starting {} ({} codons, target {})", gene.name, gene.codons.len(), gene.target());
    match config.method {
	Method::Mechanistic => simulate_gene(gene, te, rates, config, rng),
	Method::Analytical => distribute_analytically(gene, rates, rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DEFAULT_MAX_EVENTS;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn gene(len: usize, count: f64) -> Gene {
	let codons = (0..len).map(|i| Codon::from_index(i % 61).unwrap()).collect();
	Gene::new("YFG1".to_string(), codons, vec![count; len]).unwrap()
    }

    fn config(method: Method, perturbation: Option<Perturbation>) -> ExperimentConfig {
	ExperimentConfig {
	    initiation_mean_numerator: 2.0,
	    drug_mean: 1.0,
	    perturbation,
	    method,
	    max_events: DEFAULT_MAX_EVENTS,
	}
    }

    #[test]
    fn test_target_is_ceiling() {
	let g = Gene::new(
	    "g".to_string(),
	    vec![Codon::from_index(0).unwrap(); 3],
	    vec![0.5, 1.2, 0.0],
	)
	.unwrap();
	assert_eq!(g.target(), 2);
    }

    #[test]
    fn test_gene_validation() {
	let codons = vec![Codon::from_index(0).unwrap(); 2];
	assert!(Gene::new("g".into(), codons.clone(), vec![1.0]).is_err());
	assert!(Gene::new("g".into(), codons, vec![1.0, -1.0]).is_err());
    }

    #[test]
    fn test_simulate_gene_reaches_target() {
	let g = gene(40, 0.5);
	let rates = RateTable::uniform(0.5).unwrap();
	let mut rng = StdRng::seed_from_u64(21);

	let result = simulate_gene(&g, 1.0, &rates, &config(Method::Mechanistic, None), &mut rng).unwrap();
	assert_eq!(result.target, 20);
	assert_eq!(result.counts.len(), 40);
	assert_eq!(result.codons, g.codons);
	assert!(result.total() >= result.target);
	assert!(result.num_messages >= 1);
    }

    #[test]
    fn test_simulate_gene_is_reproducible() {
	let g = gene(30, 0.5);
	let rates = RateTable::uniform(0.5).unwrap();
	let cfg = config(Method::Mechanistic, Some(Perturbation::Reciprocal));

	let a = simulate_gene(&g, 2.0, &rates, &cfg, &mut StdRng::seed_from_u64(5)).unwrap();
	let b = simulate_gene(&g, 2.0, &rates, &cfg, &mut StdRng::seed_from_u64(5)).unwrap();
	assert_eq!(a, b);
    }

    #[test]
    fn test_zero_target_simulates_nothing() {
	let g = gene(10, 0.0);
	let rates = RateTable::uniform(1.0).unwrap();
	let mut rng = StdRng::seed_from_u64(0);

	let result = run_gene(&g, 1.0, &rates, &config(Method::Mechanistic, None), &mut rng).unwrap();
	assert_eq!(result.num_messages, 0);
	assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_bad_te_fails_gene() {
	let g = gene(10, 1.0);
	let rates = RateTable::uniform(1.0).unwrap();
	let mut rng = StdRng::seed_from_u64(0);
	let cfg = config(Method::Mechanistic, None);
	assert!(matches!(
	    simulate_gene(&g, 0.0, &rates, &cfg, &mut rng),
	    Err(SimulationError::InvalidParameter(_))
	));
    }

    #[test]
    fn test_config_validation() {
	assert!(config(Method::Mechanistic, None).validate().is_ok());

	let mut cfg = config(Method::Mechanistic, None);
	cfg.drug_mean = -1.0;
	assert!(cfg.validate().is_err());

	let mut cfg = config(Method::Mechanistic, None);
	cfg.initiation_mean_numerator = 0.0;
	assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_analytical() {
	let g = gene(50, 4.0);
	let rates = RateTable::uniform(1.0).unwrap();
	let mut rng = StdRng::seed_from_u64(3);

	let result = run_gene(&g, 1.0, &rates, &config(Method::Analytical, None), &mut rng).unwrap();
	assert_eq!(result.counts.len(), 50);
	assert_eq!(result.num_messages, 0);
	assert!(result.counts.iter().all(|&c| c <= 200));
	// mean 200, sd ~14
	let total = result.total();
	assert!(total > 100 && total < 300, "total = {}", total);
    }
}
