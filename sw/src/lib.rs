//! paramsweep - ordered parameter sweeps against an external target
//!
//! A recipe declares parameters and how their values are generated. The
//! sweep space maps each index to one combination without materializing the
//! product. The controller walks the indices, applying and committing each
//! combination, waiting for the target to settle, and emitting one progress
//! event per index.
//!
//! # Modules
//!
//! - [`recipe`] - parameter specifications, values, combinations
//! - [`space`] - value generation and mixed-radix enumeration
//! - [`retry`] - perform-and-confirm with bounded retries
//! - [`detector`] - completion detection over polled status signals
//! - [`controller`] - sweep lifecycle, pause and stop
//! - [`target`] - collaborator traits and the simulated target
//! - [`events`] - progress bus and JSONL run logs
//! - [`checkpoint`] - resume points from run logs
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod events;
pub mod recipe;
pub mod retry;
pub mod space;
pub mod target;

pub use checkpoint::{Checkpoint, resume_point};
pub use config::Config;
pub use controller::{Collaborators, Phase, RunState, SweepHandle, SweepSummary, Sweeper};
pub use detector::{CompletionDetector, CompletionOutcome};
pub use error::SweepError;
pub use events::{EventBus, IterationResult, SweepEvent};
pub use recipe::{Combination, ParamKind, ParamValue, ParameterSpec, SweepRecipe};
pub use retry::{RetryPolicy, perform_and_confirm};
pub use space::{SweepSpace, enumerate, total_combinations, values_of};
pub use target::{ActionSurface, ResultCapture, SignalSource, SimulatedTarget, SimulationConfig, TargetError};
