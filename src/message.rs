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

/* message.rs: stochastic ribosome traffic on a single mRNA.

One `Message` is one transcript run. Ribosomes initiate at codon 0, step
forward one codon at a time after exponentially distributed dwell times, and
run off after the last codon. Footprints may not overlap. A run first evolves
to steady state, then ends with either a drug runoff (every ribosome is
eventually arrested where it stands) or a perturbed run (elongation rates
change and the transcript is harvested a fixed time later). */

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use rand_distr::StandardUniform;

use crate::codons::Codon;
use crate::errors::{SimResult, SimulationError};
use crate::events::{Event, EventKind, EventQueue};
use crate::occupancy::OcclusionSet;
use crate::rates::{Perturbation, RateTable};
use crate::ribosome::{Ribosome, RibosomeId};

pub const DEFAULT_MAX_EVENTS: u64 = 10_000_000;

/*
NOTE: rand_distr::Exp would do the same job; written out so the
parametrization by mean, rather than by rate, is explicit. 1 - u lies in
(0, 1], so the result is always finite.
 */
#[inline(always)]
fn sample_exp<R: Rng + ?Sized>(mean: f64, rng: &mut R) -> f64 {
    let u: f64 = rng.sample(StandardUniform);
    -(1.0 - u).ln() * mean
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageParams {
    /// Mean waiting time between initiation attempts.
    pub initiation_mean: f64,
    /// Mean time for the drug to reach a ribosome, and the delay before
    /// harvest in a perturbed run.
    pub drug_mean: f64,
    /// Hard ceiling on events processed in one run.
    pub max_events: u64,
}

impl MessageParams {
    pub fn validate(&self) -> SimResult<()> {
	for (name, value) in [
	    ("initiation mean", self.initiation_mean),
	    ("drug mean", self.drug_mean),
	] {
	    if !(value.is_finite() && value > 0.0) {
		return Err(SimulationError::InvalidParameter(format!(
		    "{} must be positive and finite, got {}",
		    name, value
		)));
	    }
	}
	if self.max_events == 0 {
	    return Err(SimulationError::InvalidParameter(
		"event budget must be at least 1".into(),
	    ));
	}
	Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No ribosome has run off yet.
    WarmingUp,
    /// First runoff seen; waiting for the steady-state marker.
    ConvergingToSteadyState,
    SteadyState,
    RunningOff,
    PerturbedRun,
    Done,
}

impl Phase {
    fn describe(self) -> &'static str {
	match self {
	    Phase::WarmingUp => "warming up",
	    Phase::ConvergingToSteadyState => "converging to steady state",
	    Phase::SteadyState => "at steady state",
	    Phase::RunningOff => "running off",
	    Phase::PerturbedRun => "in a perturbed run",
	    Phase::Done => "done",
	}
    }
}

/// What happened when an event was popped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Processed {
    pub event: Event,
    pub runoff: bool,
}

pub struct Message<'a, R: Rng> {
    codons: &'a [Codon],
    rates: RateTable,
    /// Active mean dwell time at each codon position.
    mean_sequence: Vec<f64>,
    params: MessageParams,
    rng: R,

    events: EventQueue,
    occlusion: OcclusionSet,
    /// Live ribosomes. Ordered by id so that iteration, and therefore the
    /// order of random draws, is reproducible.
    ribosomes: BTreeMap<RibosomeId, Ribosome>,
    leftmost: Option<RibosomeId>,
    next_id: u64,

    current_time: f64,
    event_count: u64,
    first_runoff_event: Option<u64>,
    drug_introduced_at: Option<f64>,
    phase: Phase,

    initiations: u64,
    runoffs: u64,
}

impl<'a, R: Rng> Message<'a, R> {
    /// Set up a transcript and place the first ribosome at time zero.
    pub fn new(
	codons: &'a [Codon],
	rates: &RateTable,
	params: MessageParams,
	rng: R,
    ) -> SimResult<Self> {
	if codons.is_empty() {
	    return Err(SimulationError::InvalidSequence(
		"cannot simulate an empty transcript".into(),
	    ));
	}
	params.validate()?;

	let mut message = Message {
	    codons,
	    rates: rates.clone(),
	    mean_sequence: Vec::new(),
	    params,
	    rng,
	    events: EventQueue::new(),
	    occlusion: OcclusionSet::new(),
	    ribosomes: BTreeMap::new(),
	    leftmost: None,
	    next_id: 0,
	    current_time: 0.0,
	    event_count: 0,
	    first_runoff_event: None,
	    drug_introduced_at: None,
	    phase: Phase::WarmingUp,
	    initiations: 0,
	    runoffs: 0,
	};
	message.refresh_mean_sequence();
	message.initiate(0.0)?;

	Ok(message)
    }

    fn refresh_mean_sequence(&mut self) {
	self.mean_sequence = self
	    .codons
	    .iter()
	    .map(|&c| self.rates.mean_dwell(c))
	    .collect();
    }

    fn expect_phase(&self, expected: Phase, action: &'static str) -> SimResult<()> {
	if self.phase == expected {
	    Ok(())
	} else {
	    Err(SimulationError::ProtocolOrder {
		action,
		phase: self.phase.describe(),
	    })
	}
    }

    fn register_next_initiation(&mut self, time: f64) {
	let next = time + sample_exp(self.params.initiation_mean, &mut self.rng);
	self.events.schedule(next, EventKind::Initiate);
    }

    fn register_next_advance(&mut self, time: f64, id: RibosomeId, position: usize) {
	let next = time + sample_exp(self.mean_sequence[position], &mut self.rng);
	self.events.schedule(next, EventKind::Advance(id));
    }

    fn register_arrest(&mut self, time: f64, id: RibosomeId) {
	let arrival = time + sample_exp(self.params.drug_mean, &mut self.rng);
	self.events.schedule(arrival, EventKind::Arrest(id));
    }

    fn initiate(&mut self, time: f64) -> SimResult<()> {
	if !self.occlusion.can_occupy(0) {
	    let leftmost_arrested = self
		.leftmost
		.and_then(|id| self.ribosomes.get(&id))
		.map(|r| r.arrested)
		.ok_or_else(|| {
		    SimulationError::InvariantViolation(
			"start codon occluded but no leftmost ribosome".into(),
		    )
		})?;

	    // An arrested blocker never clears, so stop trying for good.
	    if !leftmost_arrested {
		self.register_next_initiation(time);
	    }
	    return Ok(());
	}

	let id = RibosomeId(self.next_id);
	self.next_id += 1;

	self.occlusion.occupy(0)?;
	self.ribosomes.insert(id, Ribosome::new(id));
	self.leftmost = Some(id);
	self.initiations += 1;

	self.register_next_advance(time, id, 0);
	if let Some(introduced) = self.drug_introduced_at {
	    if time > introduced {
		self.register_arrest(time, id);
	    }
	}
	self.register_next_initiation(time);

	Ok(())
    }

    /// Returns true if the ribosome ran off.
    fn advance(&mut self, time: f64, id: RibosomeId) -> SimResult<bool> {
	let (position, arrested) = match self.ribosomes.get(&id) {
	    Some(r) => (r.position, r.arrested),
	    None => {
		return Err(SimulationError::InvariantViolation(format!(
		    "advance scheduled for ribosome {} which is not on the transcript",
		    id.0
		)));
	    }
	};

	if arrested {
	    return Ok(false);
	}

	// Blocked: try again later at the same rate.
	if !self.occlusion.can_advance(position) {
	    self.register_next_advance(time, id, position);
	    return Ok(false);
	}

	self.occlusion.vacate(position)?;

	if position == self.codons.len() - 1 {
	    self.ribosomes.remove(&id);
	    if self.leftmost == Some(id) {
		self.leftmost = None;
	    }
	    self.runoffs += 1;
	    return Ok(true);
	}

	let next = position + 1;
	self.occlusion.occupy(next)?;
	if let Some(r) = self.ribosomes.get_mut(&id) {
	    r.position = next;
	}
	self.register_next_advance(time, id, next);

	Ok(false)
    }

    fn arrest(&mut self, time: f64, id: RibosomeId) {
	// The ribosome may have run off before the drug reached it.
	if let Some(r) = self.ribosomes.get_mut(&id) {
	    r.arrest(time);
	}
    }

    /// Pop and apply the earliest event. `Ok(None)` means the queue is empty.
    pub fn process_next_event(&mut self) -> SimResult<Option<Processed>> {
	let event = match self.events.pop_earliest() {
	    Some(event) => event,
	    None => return Ok(None),
	};
	// Only exceeding the bound is an error; a run may use all of it.
	if self.event_count >= self.params.max_events {
	    return Err(SimulationError::EventBudgetExceeded(self.params.max_events));
	}
	self.event_count += 1;
	self.current_time = event.time;

	let mut runoff = false;
	match event.kind {
	    EventKind::Initiate => self.initiate(event.time)?,
	    EventKind::Advance(id) => {
		runoff = self.advance(event.time, id)?;
		if runoff && self.first_runoff_event.is_none() {
		    self.first_runoff_event = Some(self.event_count);
		    if self.phase == Phase::WarmingUp {
			self.phase = Phase::ConvergingToSteadyState;
		    }
		}
	    }
	    EventKind::Arrest(id) => self.arrest(event.time, id),
	    EventKind::SteadyStateMarker | EventKind::Harvest => {}
	}

	Ok(Some(Processed { event, runoff }))
    }

    /// Process events until `kind` itself is popped.
    fn run_until(&mut self, kind: EventKind) -> SimResult<()> {
	loop {
	    match self.process_next_event()? {
		Some(p) if p.event.kind == kind => return Ok(()),
		Some(_) => {}
		None => {
		    return Err(SimulationError::InvariantViolation(format!(
			"queue drained before {:?} was reached",
			kind
		    )));
		}
	    }
	}
    }

    /// Run until the first ribosome runs off, then keep going for a further
    /// random stretch of time, uniform on [t, 2t] where t is the time of
    /// that first runoff.
    pub fn evolve_to_steady_state(&mut self) -> SimResult<()> {
	self.expect_phase(Phase::WarmingUp, "evolve to steady state")?;

	while self.first_runoff_event.is_none() {
	    if self.process_next_event()?.is_none() {
		return Err(SimulationError::NonConvergence {
		    events: self.event_count,
		    time: self.current_time,
		});
	    }
	}

	let now = self.current_time;
	let marker = self.rng.random_range(now..=2.0 * now);
	self.events.schedule(marker, EventKind::SteadyStateMarker);
	self.run_until(EventKind::SteadyStateMarker)?;

	self.phase = Phase::SteadyState;
	Ok(())
    }

    /// Add drug now: every ribosome on the transcript, and every one that
    /// initiates from here on, is arrested after an exponential delay. Runs
    /// until the queue is exhausted.
    pub fn introduce_drug(&mut self) -> SimResult<()> {
	self.add_drug()?;
	self.run_off()
    }

    /// Record the drug time and queue an arrest for every live ribosome.
    /// `run_off` drains the queue afterwards.
    pub fn add_drug(&mut self) -> SimResult<()> {
	self.expect_phase(Phase::SteadyState, "add drug")?;
	self.phase = Phase::RunningOff;

	let now = self.current_time;
	self.drug_introduced_at = Some(now);
	let live: Vec<RibosomeId> = self.ribosomes.keys().copied().collect();
	for id in live {
	    self.register_arrest(now, id);
	}
	Ok(())
    }

    pub fn run_off(&mut self) -> SimResult<()> {
	self.expect_phase(Phase::RunningOff, "run off")?;
	while self.process_next_event()?.is_some() {}
	self.phase = Phase::Done;
	Ok(())
    }

    /// Swap in perturbed rates, redraw every pending advance from them and
    /// schedule the harvest. Call `harvest` afterwards to run to it.
    ///
    /// The old draws are simply discarded. That is only equivalent to
    /// continuing the old clocks because dwell times are exponential.
    pub fn perturb_rates(&mut self, perturbation: &Perturbation) -> SimResult<()> {
	self.expect_phase(Phase::SteadyState, "perturb rates")?;
	self.phase = Phase::PerturbedRun;

	self.rates = perturbation.apply(&self.rates);
	self.refresh_mean_sequence();

	let now = self.current_time;
	let Message {
	    events,
	    ribosomes,
	    mean_sequence,
	    rng,
	    ..
	} = self;
	events.redraw_advances(|id| match ribosomes.get(&id) {
	    Some(r) => Ok(now + sample_exp(mean_sequence[r.position], &mut *rng)),
	    None => Err(SimulationError::InvariantViolation(format!(
		"queued advance for ribosome {} which is not on the transcript",
		id.0
	    ))),
	})?;

	self.events
	    .schedule(now + self.params.drug_mean, EventKind::Harvest);
	Ok(())
    }

    pub fn harvest(&mut self) -> SimResult<()> {
	self.expect_phase(Phase::PerturbedRun, "harvest")?;
	self.run_until(EventKind::Harvest)?;
	self.phase = Phase::Done;
	Ok(())
    }

    pub fn evolve_perturbed(&mut self, perturbation: &Perturbation) -> SimResult<()> {
	self.perturb_rates(perturbation)?;
	self.harvest()
    }

    /// Final ribosome positions, in increasing order.
    pub fn collect_measurements(&self) -> SimResult<Vec<usize>> {
	self.expect_phase(Phase::Done, "collect measurements")?;
	Ok(self.positions())
    }

    pub fn positions(&self) -> Vec<usize> {
	let mut positions: Vec<usize> = self.ribosomes.values().map(|r| r.position).collect();
	positions.sort_unstable();
	positions
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
	self.phase
    }

    #[cfg(test)]
    pub fn current_time(&self) -> f64 {
	self.current_time
    }

    pub fn event_count(&self) -> u64 {
	self.event_count
    }

    pub fn first_runoff_event(&self) -> Option<u64> {
	self.first_runoff_event
    }

    #[cfg(test)]
    pub fn drug_introduced_at(&self) -> Option<f64> {
	self.drug_introduced_at
    }

    pub fn initiations(&self) -> u64 {
	self.initiations
    }

    pub fn runoffs(&self) -> u64 {
	self.runoffs
    }

    #[cfg(test)]
    pub fn ribosomes(&self) -> impl Iterator<Item = &Ribosome> {
	self.ribosomes.values()
    }

    #[cfg(test)]
    pub fn occlusion(&self) -> &OcclusionSet {
	&self.occlusion
    }

    #[cfg(test)]
    pub fn events(&self) -> &EventQueue {
	&self.events
    }

    #[cfg(test)]
    pub fn rates(&self) -> &RateTable {
	&self.rates
    }

    #[cfg(test)]
    pub fn mean_sequence(&self) -> &[f64] {
	&self.mean_sequence
    }
}

impl<R: Rng> fmt::Display for Message<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
	writeln!(f, "Ribosomes:")?;
	for r in self.ribosomes.values() {
	    writeln!(f, "\t{}", r)?;
	}

	writeln!(f, "Events:")?;
	let mut pending: Vec<&Event> = self.events.pending().collect();
	pending.sort();
	for e in pending {
	    match e.kind.ribosome() {
		Some(id) => writeln!(f, "\t({}, {:?}, {})", e.time, e.kind, id.0)?,
		None => writeln!(f, "\t({}, {:?})", e.time, e.kind)?,
	    }
	}
	Ok(())
    }
}

/// One complete run: steady state, then drug runoff or, given a
/// perturbation, a perturbed run. Returns the final ribosome positions.
pub fn simulate_message<R: Rng>(
    codons: &[Codon],
    rates: &RateTable,
    params: MessageParams,
    perturbation: Option<&Perturbation>,
    rng: R,
) -> SimResult<Vec<usize>> {
    let mut message = Message::new(codons, rates, params, rng)?;
    message.evolve_to_steady_state()?;

    match perturbation {
	None => message.introduce_drug()?,
	Some(p) => message.evolve_perturbed(p)?,
    }

    log::trace!(
	"message finished after {} events (first runoff at event {:?}, {} initiated, {} ran off)\n{}",
	message.event_count(),
	message.first_runoff_event(),
	message.initiations(),
	message.runoffs(),
	message
    );
    message.collect_measurements()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occupancy::OCCLUSION_RADIUS;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn sequence(len: usize) -> Vec<Codon> {
	(0..len)
	    .map(|i| Codon::from_index((i * 7) % 61).unwrap())
	    .collect()
    }

    fn params(initiation_mean: f64, drug_mean: f64) -> MessageParams {
	MessageParams {
	    initiation_mean,
	    drug_mean,
	    max_events: DEFAULT_MAX_EVENTS,
	}
    }

    /// Checks that should hold after every event.
    fn check_state<R: Rng>(message: &Message<R>, last_positions: &mut HashMap<RibosomeId, usize>) {
	let live = message.ribosomes().count();
	assert_eq!(message.occlusion().len(), live);
	assert_eq!(message.initiations(), message.runoffs() + live as u64);

	let positions = message.positions();
	for pair in positions.windows(2) {
	    assert!(pair[1] - pair[0] >= 2 * OCCLUSION_RADIUS as usize);
	}

	for r in message.ribosomes() {
	    if let Some(&previous) = last_positions.get(&r.id) {
		assert!(r.position == previous || r.position == previous + 1);
	    }
	    last_positions.insert(r.id, r.position);
	}
    }

    #[test]
    fn test_single_codon_transcript() {
	let codons = sequence(1);
	let rates = RateTable::uniform(1.0).unwrap();
	let mut message = Message::new(&codons, &rates, params(0.5, 1.0), StdRng::seed_from_u64(1)).unwrap();

	let mut last = HashMap::new();
	for _ in 0..5_000 {
	    message.process_next_event().unwrap();
	    check_state(&message, &mut last);
	    assert!(message.ribosomes().count() <= 1);
	    assert!(message.runoffs() + 1 >= message.initiations());
	}
	assert!(message.runoffs() > 0);
    }

    #[test]
    fn test_single_codon_full_run() {
	let codons = sequence(1);
	let rates = RateTable::uniform(1.0).unwrap();
	let sample = simulate_message(&codons, &rates, params(0.5, 1.0), None, StdRng::seed_from_u64(2)).unwrap();
	assert_eq!(sample, vec![0]);
    }

    #[test]
    fn test_two_codon_exclusion_limited() {
	let codons = sequence(2);
	let rates = RateTable::uniform(1000.0).unwrap();
	// fast arrivals, slow elongation: millions of blocked initiation attempts
	let p = MessageParams { max_events: u64::MAX, ..params(0.001, 1.0) };
	let mut message = Message::new(&codons, &rates, p, StdRng::seed_from_u64(3)).unwrap();

	message.evolve_to_steady_state().unwrap();
	assert_eq!(message.phase(), Phase::SteadyState);
	assert!(message.ribosomes().count() <= 1);

	message.introduce_drug().unwrap();
	let sample = message.collect_measurements().unwrap();
	assert_eq!(sample.len(), 1);
	assert!(sample[0] < 2);
	assert!(message.events().is_empty());
    }

    #[test]
    fn test_drug_runoff_arrests_everything() {
	let codons = sequence(120);
	let rates = RateTable::uniform(0.2).unwrap();
	let mut message = Message::new(&codons, &rates, params(1.0, 5.0), StdRng::seed_from_u64(4)).unwrap();

	message.evolve_to_steady_state().unwrap();
	assert!(message.first_runoff_event().is_some());
	message.introduce_drug().unwrap();

	let introduced = message.drug_introduced_at().unwrap();
	assert!(message.ribosomes().count() > 0);
	for r in message.ribosomes() {
	    assert!(r.arrested);
	    assert!(r.arrested_at.unwrap() >= introduced);
	}
	// the ribosome nearest the start blocks initiation for good
	assert!(!message.occlusion().can_occupy(0));
	assert_eq!(message.phase(), Phase::Done);
    }

    #[test]
    fn test_uniform_perturbation_redraws_advances() {
	let codons = sequence(10);
	let rates = RateTable::from_means(Codon::all().map(|c| (c, 0.5 + c.index() as f64 / 10.0))).unwrap();
	let mut message = Message::new(&codons, &rates, params(0.3, 2.0), StdRng::seed_from_u64(5)).unwrap();
	message.evolve_to_steady_state().unwrap();

	let before: HashMap<u64, Event> = message.events().pending().map(|e| (e.seq, *e)).collect();
	assert!(before.values().any(|e| matches!(e.kind, EventKind::Advance(_))));

	message.perturb_rates(&Perturbation::Uniform).unwrap();
	assert!(message.rates().means().iter().all(|&m| m == 1.0));
	assert!(message.mean_sequence().iter().all(|&m| m == 1.0));

	let now = message.current_time();
	let mut harvests = 0;
	for e in message.events().pending() {
	    match before.get(&e.seq) {
		Some(old) => {
		    assert_eq!(old.kind, e.kind);
		    if let EventKind::Advance(_) = e.kind {
			assert_ne!(old.time, e.time);
			assert!(e.time >= now);
		    } else {
			assert_eq!(old.time, e.time);
		    }
		}
		None => {
		    assert_eq!(e.kind, EventKind::Harvest);
		    assert_eq!(e.time, now + 2.0);
		    harvests += 1;
		}
	    }
	}
	assert_eq!(harvests, 1);

	message.harvest().unwrap();
	assert_eq!(message.current_time(), now + 2.0);
	assert!(message.collect_measurements().is_ok());
    }

    #[test]
    fn test_deterministic_under_seed() {
	let codons = sequence(60);
	let rates = RateTable::from_means(Codon::all().map(|c| (c, 0.1 + (c.index() % 5) as f64 / 4.0))).unwrap();

	let mut a = Message::new(&codons, &rates, params(2.0, 1.0), StdRng::seed_from_u64(6)).unwrap();
	let mut b = Message::new(&codons, &rates, params(2.0, 1.0), StdRng::seed_from_u64(6)).unwrap();
	let trace = |p: Option<Processed>| p.map(|p| (p.event.time, p.event.seq, p.event.kind, p.runoff));
	for _ in 0..2_000 {
	    assert_eq!(trace(a.process_next_event().unwrap()), trace(b.process_next_event().unwrap()));
	}

	let shuffle = Perturbation::Shuffle;
	let run = |seed| simulate_message(&codons, &rates, params(2.0, 1.0), Some(&shuffle), StdRng::seed_from_u64(seed)).unwrap();
	assert_eq!(run(7), run(7));

	let run = |seed| simulate_message(&codons, &rates, params(2.0, 1.0), None, StdRng::seed_from_u64(seed)).unwrap();
	assert_eq!(run(8), run(8));
    }

    #[test]
    fn test_protocol_order() {
	let codons = sequence(20);
	let rates = RateTable::uniform(1.0).unwrap();
	let mut message = Message::new(&codons, &rates, params(1.0, 1.0), StdRng::seed_from_u64(9)).unwrap();

	assert!(matches!(message.introduce_drug(), Err(SimulationError::ProtocolOrder { .. })));
	assert!(matches!(message.harvest(), Err(SimulationError::ProtocolOrder { .. })));
	assert!(matches!(message.run_off(), Err(SimulationError::ProtocolOrder { .. })));
	assert!(matches!(message.collect_measurements(), Err(SimulationError::ProtocolOrder { .. })));

	message.evolve_to_steady_state().unwrap();
	assert!(matches!(message.evolve_to_steady_state(), Err(SimulationError::ProtocolOrder { .. })));
	message.introduce_drug().unwrap();
	assert!(matches!(message.perturb_rates(&Perturbation::Uniform), Err(SimulationError::ProtocolOrder { .. })));
    }

    #[test]
    fn test_event_budget() {
	let codons = sequence(300);
	let rates = RateTable::uniform(10.0).unwrap();
	let p = MessageParams { initiation_mean: 1.0, drug_mean: 1.0, max_events: 100 };
	let mut message = Message::new(&codons, &rates, p, StdRng::seed_from_u64(10)).unwrap();
	assert_eq!(message.evolve_to_steady_state(), Err(SimulationError::EventBudgetExceeded(100)));
    }

    #[test]
    fn test_run_may_use_whole_event_budget() {
	let codons = sequence(30);
	let rates = RateTable::uniform(0.5).unwrap();
	let run = |max_events: u64| -> SimResult<(Vec<usize>, u64)> {
	    let p = MessageParams { initiation_mean: 1.0, drug_mean: 1.0, max_events };
	    let mut message = Message::new(&codons, &rates, p, StdRng::seed_from_u64(12))?;
	    message.evolve_to_steady_state()?;
	    message.introduce_drug()?;
	    Ok((message.collect_measurements()?, message.event_count()))
	};

	let (sample, used) = run(1_000_000).unwrap();
	assert!(used > 1);
	assert_eq!(run(used), Ok((sample, used)));
	assert_eq!(run(used - 1), Err(SimulationError::EventBudgetExceeded(used - 1)));
    }

    #[test]
    fn test_bad_parameters() {
	let rates = RateTable::uniform(1.0).unwrap();
	let codons = sequence(5);
	let rng = StdRng::seed_from_u64(11);
	assert!(matches!(
	    Message::new(&codons, &rates, params(0.0, 1.0), rng.clone()),
	    Err(SimulationError::InvalidParameter(_))
	));
	assert!(matches!(
	    Message::new(&codons, &rates, params(1.0, f64::INFINITY), rng.clone()),
	    Err(SimulationError::InvalidParameter(_))
	));
	assert!(matches!(
	    Message::new(&[], &rates, params(1.0, 1.0), rng),
	    Err(SimulationError::InvalidSequence(_))
	));
    }

    proptest! {
	#![proptest_config(ProptestConfig::with_cases(32))]

	#[test]
	fn prop_exclusion_monotonicity_conservation(
	    len in 1usize..80,
	    initiation_mean in 0.05f64..5.0,
	    dwell in proptest::collection::vec(0.05f64..3.0, 64),
	    seed in any::<u64>(),
	) {
	    let codons = sequence(len);
	    let rates = RateTable::from_means(Codon::all().zip(dwell)).unwrap();
	    let mut message = Message::new(&codons, &rates, params(initiation_mean, 1.0), StdRng::seed_from_u64(seed)).unwrap();

	    let mut last = HashMap::new();
	    let mut previous_time = 0.0;
	    for _ in 0..3_000 {
		let processed = message.process_next_event().unwrap();
		prop_assert!(processed.is_some());
		prop_assert!(message.current_time() >= previous_time);
		previous_time = message.current_time();
		check_state(&message, &mut last);
	    }
	}

	#[test]
	fn prop_invariants_hold_through_terminal_protocols(
	    len in 1usize..60,
	    initiation_mean in 0.2f64..5.0,
	    dwell in proptest::collection::vec(0.05f64..3.0, 64),
	    seed in any::<u64>(),
	    protocol in 0usize..6,
	) {
	    let codons = sequence(len);
	    let rates = RateTable::from_means(Codon::all().zip(dwell)).unwrap();
	    let mut message = Message::new(&codons, &rates, params(initiation_mean, 0.5), StdRng::seed_from_u64(seed)).unwrap();
	    message.evolve_to_steady_state().unwrap();

	    let mut last = HashMap::new();
	    check_state(&message, &mut last);

	    let perturbation = match protocol {
		0 => None,
		1 => Some(Perturbation::Reciprocal),
		2 => Some(Perturbation::Shuffle),
		3 => Some(Perturbation::Uniform),
		4 => Some(Perturbation::ChangeOne("CGA".parse().unwrap())),
		_ => Some(Perturbation::ChangeAll(RateTable::uniform(0.7).unwrap())),
	    };

	    match perturbation {
		None => {
		    message.add_drug().unwrap();
		    while message.process_next_event().unwrap().is_some() {
			check_state(&message, &mut last);
		    }
		    message.run_off().unwrap();

		    prop_assert!(message.ribosomes().count() >= 1);
		    prop_assert!(message.ribosomes().all(|r| r.arrested));
		    prop_assert!(message.ribosomes().all(|r| r.arrested_at.is_some()));
		    prop_assert!(message.collect_measurements().is_ok());
		}
		Some(p) => {
		    message.perturb_rates(&p).unwrap();
		    loop {
			let processed = message.process_next_event().unwrap();
			prop_assert!(processed.is_some());
			check_state(&message, &mut last);
			if processed.map(|p| p.event.kind) == Some(EventKind::Harvest) {
			    break;
			}
		    }
		    prop_assert!(message.ribosomes().all(|r| !r.arrested));
		}
	    }
	}
    }
}
