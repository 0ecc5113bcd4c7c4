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

/* occupancy.rs: steric exclusion bookkeeping for one transcript.

Each live ribosome is recorded by the left edge of its footprint,
position - OCCLUSION_RADIUS. A footprint covers [edge, edge + 2 * radius), so
two ribosomes may sit no closer than 2 * radius codons apart. */

use std::collections::BTreeSet;

use crate::errors::{SimResult, SimulationError};

pub const OCCLUSION_RADIUS: i64 = 5;

const FOOTPRINT_WIDTH: i64 = 2 * OCCLUSION_RADIUS;

#[inline(always)]
pub fn left_edge(position: usize) -> i64 {
    position as i64 - OCCLUSION_RADIUS
}

#[derive(Debug, Default, Clone)]
pub struct OcclusionSet {
    left_edges: BTreeSet<i64>,
}

impl OcclusionSet {
    pub fn new() -> Self {
	Self::default()
    }

    /// Is any recorded footprint, other than the one at `except`, overlapping
    /// a footprint placed at `position`?
    fn overlaps(&self, position: usize, except: Option<i64>) -> bool {
	let edge = left_edge(position);
	self.left_edges
	    .range(edge - FOOTPRINT_WIDTH + 1..=edge + FOOTPRINT_WIDTH - 1)
	    .any(|&e| Some(e) != except)
    }

    /// True iff a ribosome could be placed at `position` without touching any
    /// recorded footprint.
    pub fn can_occupy(&self, position: usize) -> bool {
	!self.overlaps(position, None)
    }

    /// True iff the ribosome currently at `position` could step to
    /// `position + 1`. Its own footprint does not count against it.
    pub fn can_advance(&self, position: usize) -> bool {
	!self.overlaps(position + 1, Some(left_edge(position)))
    }

    pub fn occupy(&mut self, position: usize) -> SimResult<()> {
	if !self.can_occupy(position) {
	    return Err(SimulationError::InvariantViolation(format!(
		"footprint at codon {} overlaps an occupied footprint",
		position
	    )));
	}
	self.left_edges.insert(left_edge(position));
	Ok(())
    }

    pub fn vacate(&mut self, position: usize) -> SimResult<()> {
	if !self.left_edges.remove(&left_edge(position)) {
	    return Err(SimulationError::InvariantViolation(format!(
		"no footprint recorded at codon {}",
		position
	    )));
	}
	Ok(())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
	self.left_edges.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
	self.left_edges.is_empty()
    }

    /// Left edges in increasing order.
    #[cfg(test)]
    pub fn left_edges(&self) -> impl Iterator<Item = i64> + '_ {
	self.left_edges.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupy_and_vacate() {
	let mut set = OcclusionSet::new();
	assert!(set.can_occupy(0));
	set.occupy(0).unwrap();
	assert_eq!(set.left_edges().collect::<Vec<_>>(), vec![-5]);

	set.vacate(0).unwrap();
	assert!(set.is_empty());
	assert!(matches!(set.vacate(0), Err(SimulationError::InvariantViolation(_))));
    }

    #[test]
    fn test_start_blocked_until_ten_codons_clear() {
	let mut set = OcclusionSet::new();
	set.occupy(9).unwrap();
	assert!(!set.can_occupy(0));
	set.vacate(9).unwrap();
	set.occupy(10).unwrap();
	assert!(set.can_occupy(0));
    }

    #[test]
    fn test_double_occupancy_is_fatal() {
	let mut set = OcclusionSet::new();
	set.occupy(20).unwrap();
	assert!(matches!(set.occupy(20), Err(SimulationError::InvariantViolation(_))));
	assert!(matches!(set.occupy(14), Err(SimulationError::InvariantViolation(_))));
	assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_advance_blocked_by_leader_only() {
	let mut set = OcclusionSet::new();
	set.occupy(0).unwrap();
	set.occupy(11).unwrap();

	// trailing ribosome may close to ten codons, no closer
	assert!(set.can_advance(0));
	set.vacate(0).unwrap();
	set.occupy(1).unwrap();
	assert!(!set.can_advance(1));

	// the leader is never held back by the follower
	assert!(set.can_advance(11));
    }
}
