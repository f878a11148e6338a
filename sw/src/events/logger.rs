//! Event Logger - persists sweep events to JSONL files
//!
//! Subscribes to the [`EventBus`] and appends every event to
//! `<runs_dir>/<run-id>/events.jsonl`, which is what `resume` reads back.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, SweepEvent};
use crate::error::SweepError;

pub const EVENTS_FILE: &str = "events.jsonl";

/// Path of a run's event log
pub fn run_log_path(runs_dir: impl AsRef<Path>, run_id: &str) -> PathBuf {
    runs_dir.as_ref().join(run_id).join(EVENTS_FILE)
}

/// Writes events to per-run JSONL files
pub struct EventLogger {
    runs_dir: PathBuf,
    writers: HashMap<String, BufWriter<File>>,
}

impl EventLogger {
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        let runs_dir = runs_dir.as_ref().to_path_buf();
        debug!(?runs_dir, "EventLogger::new: creating logger");
        Self {
            runs_dir,
            writers: HashMap::new(),
        }
    }

    /// Append one event to its run's log
    pub fn write_event(&mut self, event: &SweepEvent) -> Result<(), SweepError> {
        let run_id = event.run_id();
        debug!(%run_id, event_type = event.event_type(), "EventLogger::write_event");

        let writer = match self.writers.entry(run_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let run_dir = self.runs_dir.join(run_id);
                fs::create_dir_all(&run_dir)?;
                let log_path = run_dir.join(EVENTS_FILE);
                debug!(?log_path, "EventLogger: opening log file");
                let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
                entry.insert(BufWriter::new(file))
            }
        };

        let json = serde_json::to_string(&EventLogEntry::new(event.clone()))?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }

    pub fn close_run(&mut self, run_id: &str) {
        debug!(%run_id, "EventLogger::close_run");
        if let Some(mut writer) = self.writers.remove(run_id) {
            let _ = writer.flush();
        }
    }

    /// Consume events from the bus until every sender is gone
    pub async fn run(mut self, mut rx: broadcast::Receiver<SweepEvent>) {
        debug!("EventLogger::run: starting event logger");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(run_id = event.run_id(), error = %e, "EventLogger: failed to write event");
                    }
                    if let SweepEvent::SweepCompleted { run_id, .. } = &event {
                        self.close_run(run_id);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (run_id, mut writer) in self.writers.drain() {
            debug!(%run_id, "EventLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read a run's event log; a missing log reads as empty
pub fn read_run_events(runs_dir: impl AsRef<Path>, run_id: &str) -> Result<Vec<EventLogEntry>, SweepError> {
    let log_path = run_log_path(runs_dir, run_id);
    debug!(?log_path, "read_run_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_run_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_run_events: loaded entries");
    Ok(entries)
}

/// Spawn the logger as a background task
///
/// Subscribes before returning so no event emitted afterwards is missed.
pub fn spawn_event_logger(event_bus: &Arc<EventBus>, runs_dir: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let logger = EventLogger::new(runs_dir);
    let rx = event_bus.subscribe();
    tokio::spawn(logger.run(rx))
}
