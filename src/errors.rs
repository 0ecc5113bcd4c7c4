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

/* errors.rs: everything that can go wrong inside a transcript simulation. */

use thiserror::Error;

/// Failures of the simulation core. None of these are retried: a run that
/// hits one is abandoned and the error is reported for its gene.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// Exclusion bookkeeping went inconsistent, i.e. a modeling bug.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The queue ran dry before any ribosome finished translating.
    #[error("no ribosome ran off after {events} events (queue exhausted at t = {time})")]
    NonConvergence { events: u64, time: f64 },

    #[error("run exceeded the budget of {0} events")]
    EventBudgetExceeded(u64),

    #[error("unknown perturbation model '{0}'")]
    UnknownPerturbation(String),

    #[error("no mean dwell time given for codon {0}")]
    MissingRate(String),

    #[error("mean dwell time for codon {codon} must be positive and finite, got {mean}")]
    InvalidRate { codon: String, mean: f64 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    /// A protocol was invoked out of order, e.g. harvesting before steady state.
    #[error("cannot {action} while {phase}")]
    ProtocolOrder { action: &'static str, phase: &'static str },
}

pub type SimResult<T> = std::result::Result<T, SimulationError>;
