//! Run lifecycle state shared between the controller and its handles

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the controller is in its lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Paused,
    StopRequested,
    Completed,
}

impl Phase {
    /// A sweep owns the controller in these phases
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::StopRequested)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::StopRequested => write!(f, "stop-requested"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Published by the controller, read by everyone else
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub phase: Phase,
    pub current_index: u64,
    pub run_id: Option<String>,
}

/// Inbound pause/stop requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlSignal {
    pub paused: bool,
    pub stop: bool,
}

impl ControlSignal {
    /// Whether a paused loop may stop waiting
    pub fn releases_pause(&self) -> bool {
        self.stop || !self.paused
    }
}
