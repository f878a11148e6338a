//! The completion state machine, as a pure transition function
//!
//! ```text
//!             updating/outdated              success/empty
//!   Unknown ─────────────────────▶ Transitioning ──────────────▶ Resolved
//!     │  ▲                            │   ▲  │
//!     │  └─ success/empty (stale) ────┘   └──┘ updating/outdated, nothing
//!     │
//!     └─ elapsed ≥ initial timeout ─────────────────────────────▶ TimedOut
//!
//!   any non-terminal state ── elapsed ≥ absolute ceiling ───────▶ TimedOut
//! ```
//!
//! Success or empty can only resolve from `Transitioning` (unless the caller
//! waives the requirement), which is what keeps a result still on display
//! from the previous iteration from being mistaken for the current one.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Terminal outcome of one completion wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Finished with a result
    Success,
    /// Finished with a neutral, empty result
    Empty,
    /// The target reported that this configuration produces no output
    NoResult,
    /// Gave up waiting
    Timeout,
}

impl std::fmt::Display for CompletionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Empty => write!(f, "empty"),
            Self::NoResult => write!(f, "no-result"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// One poll's reading of the four status signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    pub updating: bool,
    pub outdated: bool,
    pub success: bool,
    pub empty: bool,
}

impl Observation {
    fn in_progress(&self) -> bool {
        self.updating || self.outdated
    }

    fn finished(&self) -> Option<CompletionOutcome> {
        if self.success {
            Some(CompletionOutcome::Success)
        } else if self.empty {
            Some(CompletionOutcome::Empty)
        } else {
            None
        }
    }
}

/// Time budgets and guard for one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Budget for seeing the first transition
    pub initial_timeout: Duration,

    /// Hard stop regardless of state
    pub absolute_ceiling: Duration,

    /// Success/empty only count after a transition was observed
    pub require_transition: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// No transition seen yet
    Unknown,

    /// Target has been seen processing this iteration
    Transitioning { polls: u32 },

    Resolved {
        outcome: CompletionOutcome,
        after_transition: bool,
    },

    TimedOut { after_transition: bool },
}

impl DetectorState {
    /// Apply one observation taken `elapsed` after the wait began
    pub fn step(self, obs: Observation, elapsed: Duration, limits: &Limits) -> Self {
        let transitioned = match self {
            Self::Resolved { .. } | Self::TimedOut { .. } => return self,
            Self::Unknown => false,
            Self::Transitioning { .. } => true,
        };

        if elapsed >= limits.absolute_ceiling {
            return Self::TimedOut {
                after_transition: transitioned,
            };
        }

        if obs.in_progress() {
            return match self {
                Self::Transitioning { polls } => Self::Transitioning { polls: polls + 1 },
                _ => Self::Transitioning { polls: 1 },
            };
        }

        if let Some(outcome) = obs.finished()
            && (transitioned || !limits.require_transition)
        {
            return Self::Resolved {
                outcome,
                after_transition: transitioned,
            };
        }

        match self {
            // Once processing was seen, only a terminal signal or the ceiling ends the wait
            Self::Transitioning { polls } => Self::Transitioning { polls: polls + 1 },
            _ if elapsed >= limits.initial_timeout => Self::TimedOut { after_transition: false },
            _ => Self::Unknown,
        }
    }

    /// The outcome, once terminal
    pub fn outcome(&self) -> Option<CompletionOutcome> {
        match self {
            Self::Resolved { outcome, .. } => Some(*outcome),
            Self::TimedOut { .. } => Some(CompletionOutcome::Timeout),
            _ => None,
        }
    }

    pub fn has_observed_transition(&self) -> bool {
        match self {
            Self::Unknown => false,
            Self::Transitioning { .. } => true,
            Self::Resolved { after_transition, .. } | Self::TimedOut { after_transition } => *after_transition,
        }
    }
}
