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

/* codons.rs: the 64-letter codon alphabet. */

use std::fmt;
use std::str::FromStr;

use crate::errors::{SimResult, SimulationError};

/// Bases in the order used to enumerate codons: TTT, TTC, TTA, TTG, TCT, ...
const BASES: [u8; 4] = [b'T', b'C', b'A', b'G'];

pub const NUM_CODONS: usize = 64;

/// One of the 64 codons, stored as its index in TCAG lexicographic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Codon(u8);

#[inline(always)]
fn base_index(base: u8) -> Option<u8> {
    match base.to_ascii_uppercase() {
	b'T' | b'U' => Some(0),
	b'C' => Some(1),
	b'A' => Some(2),
	b'G' => Some(3),
	_ => None,
    }
}

impl Codon {
    #[cfg(test)]
    pub fn from_index(index: usize) -> Option<Codon> {
	if index < NUM_CODONS {
	    Some(Codon(index as u8))
	} else {
	    None
	}
    }

    pub fn index(self) -> usize {
	self.0 as usize
    }

    pub fn from_bases(bases: &[u8]) -> Option<Codon> {
	if bases.len() != 3 {
	    return None;
	}
	let mut index = 0u8;
	for &b in bases {
	    index = index * 4 + base_index(b)?;
	}
	Some(Codon(index))
    }

    pub fn bases(self) -> [u8; 3] {
	let i = self.0 as usize;
	[BASES[i / 16], BASES[(i / 4) % 4], BASES[i % 4]]
    }

    pub fn is_stop(self) -> bool {
	matches!(&self.bases(), b"TAA" | b"TAG" | b"TGA")
    }

    /// All 64 codons, in index order.
    pub fn all() -> impl Iterator<Item = Codon> {
	(0..NUM_CODONS as u8).map(Codon)
    }
}

impl fmt::Display for Codon {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
	let b = self.bases();
	write!(f, "{}{}{}", b[0] as char, b[1] as char, b[2] as char)
    }
}

impl FromStr for Codon {
    type Err = SimulationError;

    fn from_str(s: &str) -> SimResult<Codon> {
	Codon::from_bases(s.trim().as_bytes())
	    .ok_or_else(|| SimulationError::InvalidSequence(format!("'{}' is not a codon", s)))
    }
}

/// Split a coding sequence into codons. The sequence is expected to run from
/// the start codon through the stop codon inclusive.
pub fn codons_from_nucleotides(seq: &[u8]) -> SimResult<Vec<Codon>> {
    if seq.is_empty() {
	return Err(SimulationError::InvalidSequence("empty coding sequence".into()));
    }
    if seq.len() % 3 != 0 {
	return Err(SimulationError::InvalidSequence(format!(
	    "length {} is not a multiple of 3",
	    seq.len()
	)));
    }

    seq.chunks(3)
	.enumerate()
	.map(|(i, triplet)| {
	    Codon::from_bases(triplet).ok_or_else(|| {
		SimulationError::InvalidSequence(format!(
		    "non-nucleotide character in codon {} ('{}')",
		    i,
		    String::from_utf8_lossy(triplet)
		))
	    })
	})
	.collect()
}
