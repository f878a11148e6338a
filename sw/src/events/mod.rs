//! Progress events
//!
//! ```text
//!   Sweeper ──emit──▶ EventBus (broadcast) ──▶ EventLogger ──▶ <runs>/<id>/events.jsonl
//!                                         └──▶ CLI progress printer
//! ```
//!
//! Every processed index produces one `IterationProgress`; every sweep ends
//! with one `SweepCompleted`. The JSONL log doubles as the checkpoint source.

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use logger::{EVENTS_FILE, EventLogger, read_run_events, run_log_path, spawn_event_logger};
pub use types::{EventLogEntry, IterationResult, SweepEvent};
