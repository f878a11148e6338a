//! Event Bus - pub/sub for sweep progress
//!
//! Built on a tokio broadcast channel. The controller emits, consumers
//! (the JSONL logger, the CLI progress printer) subscribe.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{IterationResult, SweepEvent};
use crate::recipe::Combination;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4_096;

/// Central event bus for sweep activity
pub struct EventBus {
    tx: broadcast::Sender<SweepEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Fire-and-forget: with no subscribers the event is dropped
    pub fn emit(&self, event: SweepEvent) {
        debug!(event_type = event.event_type(), run_id = event.run_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Emitter bound to one run id
    pub fn emitter_for(&self, run_id: impl Into<String>) -> EventEmitter {
        let run_id = run_id.into();
        debug!(%run_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            run_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cheap, cloneable handle that stamps events with its run id
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<SweepEvent>,
    run_id: String,
}

impl EventEmitter {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn emit(&self, event: SweepEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    pub fn sweep_started(&self, recipe: &str, start_index: u64, total: u64) {
        self.emit(SweepEvent::SweepStarted {
            run_id: self.run_id.clone(),
            recipe: recipe.to_string(),
            start_index,
            total,
        });
    }

    pub fn iteration_progress(&self, index: u64, total: u64, combination: Combination, result: IterationResult) {
        self.emit(SweepEvent::IterationProgress {
            run_id: self.run_id.clone(),
            index,
            total,
            combination,
            result,
        });
    }

    pub fn sweep_completed(&self, processed: u64, failed: u64, stopped: bool, next_index: u64) {
        self.emit(SweepEvent::SweepCompleted {
            run_id: self.run_id.clone(),
            processed,
            failed,
            stopped,
            next_index,
        });
    }

    pub fn warning(&self, context: &str, message: &str) {
        self.emit(SweepEvent::Warning {
            run_id: self.run_id.clone(),
            context: context.to_string(),
            message: message.to_string(),
        });
    }

    pub fn error(&self, context: &str, message: &str) {
        self.emit(SweepEvent::Error {
            run_id: self.run_id.clone(),
            context: context.to_string(),
            message: message.to_string(),
        });
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
