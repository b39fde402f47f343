//! Round bookkeeping for iterable computations.

use tracing::{debug, warn};

use crate::gla::Termination;

/// Where a computation is within its current round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundState {
    Scanning,
    Merging,
    Deciding,
    Terminated(Termination),
}

/// Drives the `Scanning -> Merging -> Deciding` cycle and enforces the
/// round cap.
#[derive(Debug)]
pub struct RoundController {
    name: &'static str,
    state: RoundState,
    rounds: usize,
    max_rounds: usize,
}

impl RoundController {
    /// At least one round always runs, even with `max_rounds == 0`.
    pub fn new(name: &'static str, max_rounds: usize) -> Self {
        Self {
            name,
            state: RoundState::Scanning,
            rounds: 0,
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    /// Number of completed rounds.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn start_merge(&mut self) {
        debug_assert_eq!(self.state, RoundState::Scanning);
        self.state = RoundState::Merging;
    }

    pub fn start_decision(&mut self) {
        debug_assert_eq!(self.state, RoundState::Merging);
        self.state = RoundState::Deciding;
    }

    /// Records the operator's decision for the round that just finished.
    /// Returns how the computation ended, or `None` if another round must
    /// run.
    pub fn finish_round(&mut self, iterate: bool) -> Option<Termination> {
        debug_assert_eq!(self.state, RoundState::Deciding);
        self.rounds += 1;

        let termination = if !iterate {
            debug!(
                "{}: fixed point reached after {} rounds",
                self.name, self.rounds
            );
            Termination::Converged
        } else if self.rounds >= self.max_rounds {
            warn!(
                "{}: stopping after {} rounds without converging",
                self.name, self.rounds
            );
            Termination::RoundCap
        } else {
            self.state = RoundState::Scanning;
            return None;
        };

        self.state = RoundState::Terminated(termination);
        Some(termination)
    }
}
