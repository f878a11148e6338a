//! Collaborator contracts for the system being swept
//!
//! The core never touches a UI directly. Whatever automates the target
//! (a browser page, a remote API, the in-process simulator) implements these
//! three traits and the controller drives them.

use async_trait::async_trait;
use thiserror::Error;

use crate::recipe::Combination;

mod sim;

pub use sim::{SimulatedTarget, SimulationConfig};

/// Errors raised by a target collaborator
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Failed to apply configuration: {0}")]
    Apply(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Signal probe failed: {0}")]
    Probe(String),

    #[error("Result capture failed: {0}")]
    Capture(String),
}

/// Where configuration is written and committed
#[async_trait]
pub trait ActionSurface: Send + Sync {
    /// Write every value of the combination into the target's inputs
    async fn apply_configuration(&self, combination: &Combination) -> Result<(), TargetError>;

    /// Press the target's commit control; may be invoked repeatedly
    async fn trigger_commit(&self) -> Result<(), TargetError>;

    /// Whether the last commit took effect
    async fn is_commit_confirmed(&self) -> Result<bool, TargetError>;
}

/// The target's processing indicators
///
/// The four status probes are independent; more than one may be true at a
/// time and the detector decides precedence.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn is_updating(&self) -> Result<bool, TargetError>;

    /// Results are stale and need an explicit refresh
    async fn is_outdated(&self) -> Result<bool, TargetError>;

    async fn is_success(&self) -> Result<bool, TargetError>;

    async fn is_empty(&self) -> Result<bool, TargetError>;

    /// The configuration legitimately produced no output
    async fn has_no_result(&self) -> Result<bool, TargetError>;

    /// Ask an outdated target to recompute
    async fn trigger_refresh(&self) -> Result<(), TargetError> {
        Ok(())
    }
}

/// Reads the structured result once processing has settled
#[async_trait]
pub trait ResultCapture: Send + Sync {
    async fn capture_result(&self) -> Result<serde_json::Value, TargetError>;
}
