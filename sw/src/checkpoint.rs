//! Resume points recovered from a run's event log

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::{EventLogEntry, SweepEvent};

/// Where an interrupted run should pick up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub next_index: u64,
    pub total: u64,
}

/// Work out the first unprocessed index of a logged run
///
/// Returns `None` for an empty log or one whose last sweep ran to the end.
/// A log can hold several sweeps under the same run id (a run that was
/// already resumed once); progress across all of them counts.
pub fn resume_point(entries: &[EventLogEntry]) -> Option<Checkpoint> {
    debug!(entries = entries.len(), "resume_point: called");
    let mut run_id: Option<&str> = None;
    let mut next_index: Option<u64> = None;
    let mut total: u64 = 0;
    let mut finished = false;

    for entry in entries {
        match &entry.event {
            SweepEvent::SweepStarted {
                run_id: id,
                start_index,
                total: t,
                ..
            } => {
                run_id = Some(id.as_str());
                total = *t;
                finished = false;
                next_index = Some(next_index.map_or(*start_index, |n| n.max(*start_index)));
            }
            SweepEvent::IterationProgress { index, total: t, .. } => {
                total = *t;
                next_index = Some(next_index.map_or(index + 1, |n| n.max(index + 1)));
            }
            SweepEvent::SweepCompleted { stopped, next_index: n, .. } => {
                finished = !stopped && *n >= total;
            }
            SweepEvent::Warning { .. } | SweepEvent::Error { .. } => {}
        }
    }

    let run_id = run_id?;
    let next_index = next_index?;
    if finished || next_index >= total {
        debug!(run_id, next_index, total, "resume_point: run already complete");
        return None;
    }
    Some(Checkpoint {
        run_id: run_id.to_string(),
        next_index,
        total,
    })
}
