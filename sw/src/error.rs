//! Error types for the sweep engine

use std::path::PathBuf;
use thiserror::Error;

use crate::target::TargetError;

/// Errors surfaced by the library
///
/// Most failures inside a sweep are not errors at all: bad parameter values
/// degrade to empty value lists, commit failures come back as `false`, and
/// detector timeouts are outcomes. What remains is recipe I/O, lifecycle
/// misuse, and collaborator failures inside a single iteration.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Failed to load recipe {path}: {message}")]
    Recipe { path: PathBuf, message: String },

    #[error("A sweep is already active (phase: {phase})")]
    AlreadyRunning { phase: String },

    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
