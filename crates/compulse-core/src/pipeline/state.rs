use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::resolve::ResolutionOutcome;

/// Progress of one dataset's resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    Pending,
    CacheHit,
    CacheMiss,
    Fetching,
    CandidatesReady,
    Scored,
    Accepted,
    Rejected,
    Ambiguous,
    FetchFailed,
    SourceUnavailable,
}

impl ResolutionState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Rejected | Self::Ambiguous | Self::SourceUnavailable
        )
    }

    /// Any unfinished resolution may still be cut short by a timeout or
    /// cancellation, so every non-terminal state can reach
    /// `SourceUnavailable`.
    pub const fn can_advance_to(self, next: Self) -> bool {
        if matches!(next, Self::SourceUnavailable) {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Pending, Self::CacheHit | Self::CacheMiss)
                | (Self::CacheMiss, Self::Fetching)
                | (Self::CacheHit | Self::Fetching, Self::CandidatesReady)
                | (Self::Fetching, Self::FetchFailed)
                | (Self::CandidatesReady, Self::Scored)
                | (Self::Scored, Self::Accepted | Self::Rejected | Self::Ambiguous)
        )
    }
}

/// Ordered record of the states one resolution passed through.
///
/// Shared by reference between the resolving future and whoever cuts it
/// short, hence the interior lock.
#[derive(Debug)]
pub struct ResolutionTrace {
    states: Mutex<Vec<ResolutionState>>,
}

impl Default for ResolutionTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionTrace {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(vec![ResolutionState::Pending]),
        }
    }

    /// Append `next` if it is a legal step from the current state.
    pub fn record(&self, next: ResolutionState) -> bool {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let current = states.last().copied().unwrap_or(ResolutionState::Pending);

        if current.can_advance_to(next) {
            states.push(next);
            true
        } else {
            tracing::warn!("Ignoring resolution step {:?} -> {:?}", current, next);
            false
        }
    }

    pub fn current(&self) -> ResolutionState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
            .unwrap_or(ResolutionState::Pending)
    }

    /// Record the terminal state matching `outcome`.
    pub fn finish(&self, outcome: &ResolutionOutcome) {
        let terminal = match outcome {
            ResolutionOutcome::Accepted(_) => ResolutionState::Accepted,
            ResolutionOutcome::Rejected { .. } => ResolutionState::Rejected,
            ResolutionOutcome::Ambiguous { .. } => ResolutionState::Ambiguous,
            ResolutionOutcome::SourceUnavailable { .. } => {
                if self.current() == ResolutionState::Fetching {
                    self.record(ResolutionState::FetchFailed);
                }
                ResolutionState::SourceUnavailable
            }
        };
        self.record(terminal);
    }

    pub fn states(&self) -> Vec<ResolutionState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
