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

/* events.rs: the time-ordered queue driving a transcript simulation. */

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::ribosome::RibosomeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Initiate,
    Advance(RibosomeId),
    /// Drug reaches a ribosome and freezes it.
    Arrest(RibosomeId),
    SteadyStateMarker,
    Harvest,
}

impl EventKind {
    pub fn ribosome(&self) -> Option<RibosomeId> {
	match *self {
	    EventKind::Advance(id) | EventKind::Arrest(id) => Some(id),
	    _ => None,
	}
    }
}

/// A scheduled event. Ordering looks only at `(time, seq)`: the sequence
/// number breaks ties by insertion order, so the payload is never compared.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub time: f64,
    pub seq: u64,
    pub kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
	self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
	Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
	self.time
	    .total_cmp(&other.time)
	    .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Min-heap of events keyed on `(time, seq)`.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
	Self::default()
    }

    /// Returns the sequence number assigned to the new event.
    pub fn schedule(&mut self, time: f64, kind: EventKind) -> u64 {
	let seq = self.next_seq;
	self.next_seq += 1;
	self.heap.push(Reverse(Event { time, seq, kind }));
	seq
    }

    pub fn pop_earliest(&mut self) -> Option<Event> {
	self.heap.pop().map(|Reverse(event)| event)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
	self.heap.is_empty()
    }

    /// Pending events in no particular order.
    pub fn pending(&self) -> impl Iterator<Item = &Event> {
	self.heap.iter().map(|Reverse(event)| event)
    }

    /// Give every queued `Advance` a new timestamp from `redraw`. All other
    /// events, and every sequence number, are left untouched. On error the
    /// queue is still whole, though some advances may already be redrawn.
    pub fn redraw_advances<F, E>(&mut self, mut redraw: F) -> Result<(), E>
    where
	F: FnMut(RibosomeId) -> Result<f64, E>,
    {
	let mut events: Vec<Reverse<Event>> = std::mem::take(&mut self.heap).into_vec();
	let mut result = Ok(());
	for Reverse(event) in events.iter_mut() {
	    if let EventKind::Advance(id) = event.kind {
		match redraw(id) {
		    Ok(time) => event.time = time,
		    Err(e) => {
			result = Err(e);
			break;
		    }
		}
	    }
	}
	self.heap = BinaryHeap::from(events);
	result
    }
}
