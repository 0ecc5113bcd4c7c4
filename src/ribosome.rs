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

/* ribosome.rs: a single translating ribosome. */

use std::fmt;

/// Identity of a ribosome within one transcript simulation. Handed out in
/// increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RibosomeId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Ribosome {
    pub id: RibosomeId,
    /// Codon index of the ribosome; only ever increases.
    pub position: usize,
    pub arrested: bool,
    pub arrested_at: Option<f64>,
}

impl Ribosome {
    pub fn new(id: RibosomeId) -> Self {
	Ribosome {
	    id,
	    position: 0,
	    arrested: false,
	    arrested_at: None,
	}
    }

    /// Freeze the ribosome. A second arrest is a no-op and keeps the first
    /// timestamp; returns whether anything changed.
    pub fn arrest(&mut self, time: f64) -> bool {
	if self.arrested {
	    return false;
	}
	self.arrested = true;
	self.arrested_at = Some(time);
	true
    }
}

impl fmt::Display for Ribosome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
	write!(
	    f,
	    "id: {}, position: {}, arrested: {}",
	    self.id.0, self.position, self.arrested
	)?;
	if let Some(t) = self.arrested_at {
	    write!(f, " ({})", t)?;
	}
	Ok(())
    }
}
