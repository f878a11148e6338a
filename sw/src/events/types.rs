//! Event types for sweep progress streaming

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detector::CompletionOutcome;
use crate::recipe::Combination;

/// What one iteration produced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IterationResult {
    /// The result capture ran after the wait resolved
    Captured {
        outcome: CompletionOutcome,
        record: serde_json::Value,
    },
    /// The target showed its no-result marker
    NoResult,
    /// Applying, waiting or capturing failed; the sweep moved on
    Failed { message: String },
}

impl IterationResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short label for display
    pub fn label(&self) -> String {
        match self {
            Self::Captured { outcome, .. } => outcome.to_string(),
            Self::NoResult => "no-result".to_string(),
            Self::Failed { .. } => "failed".to_string(),
        }
    }
}

/// Everything the sweep reports outward
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SweepEvent {
    SweepStarted {
        run_id: String,
        recipe: String,
        start_index: u64,
        total: u64,
    },
    /// Exactly one per processed index
    IterationProgress {
        run_id: String,
        index: u64,
        total: u64,
        combination: Combination,
        result: IterationResult,
    },
    /// Exactly one per sweep, whether it finished or was stopped
    SweepCompleted {
        run_id: String,
        processed: u64,
        failed: u64,
        stopped: bool,
        next_index: u64,
    },
    Warning {
        run_id: String,
        context: String,
        message: String,
    },
    Error {
        run_id: String,
        context: String,
        message: String,
    },
}

impl SweepEvent {
    pub fn run_id(&self) -> &str {
        match self {
            SweepEvent::SweepStarted { run_id, .. }
            | SweepEvent::IterationProgress { run_id, .. }
            | SweepEvent::SweepCompleted { run_id, .. }
            | SweepEvent::Warning { run_id, .. }
            | SweepEvent::Error { run_id, .. } => run_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SweepEvent::SweepStarted { .. } => "SweepStarted",
            SweepEvent::IterationProgress { .. } => "IterationProgress",
            SweepEvent::SweepCompleted { .. } => "SweepCompleted",
            SweepEvent::Warning { .. } => "Warning",
            SweepEvent::Error { .. } => "Error",
        }
    }
}

/// One line of a run's JSONL log
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: SweepEvent,
}

impl EventLogEntry {
    pub fn new(event: SweepEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{Assignment, ParamValue};

    #[test]
    fn test_event_run_id_and_type() {
        let event = SweepEvent::SweepStarted {
            run_id: "run-1".to_string(),
            recipe: "demo".to_string(),
            start_index: 0,
            total: 6,
        };
        assert_eq!(event.run_id(), "run-1");
        assert_eq!(event.event_type(), "SweepStarted");
    }

    #[test]
    fn test_progress_event_json_shape() {
        let event = SweepEvent::IterationProgress {
            run_id: "run-1".to_string(),
            index: 4,
            total: 6,
            combination: Combination::new(vec![Assignment::new("stop", ParamValue::Int(3))]),
            result: IterationResult::NoResult,
        };
        let json = serde_json::to_value(EventLogEntry::new(event)).unwrap();

        assert!(json.get("ts").is_some());
        assert_eq!(json["event"]["type"], "IterationProgress");
        assert_eq!(json["event"]["index"], 4);
        assert_eq!(json["event"]["result"]["kind"], "no_result");
        assert_eq!(json["event"]["combination"][0]["name"], "stop");
    }

    #[test]
    fn test_entry_parses_back() {
        let event = SweepEvent::IterationProgress {
            run_id: "run-2".to_string(),
            index: 0,
            total: 1,
            combination: Combination::new(vec![Assignment::new("mode", ParamValue::Choice("fast".to_string()))]),
            result: IterationResult::Captured {
                outcome: CompletionOutcome::Success,
                record: serde_json::json!({"net_profit": 12.5}),
            },
        };
        let line = serde_json::to_string(&EventLogEntry::new(event.clone())).unwrap();
        let parsed: EventLogEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.event, event);
    }

    #[test]
    fn test_result_labels() {
        assert_eq!(IterationResult::NoResult.label(), "no-result");
        assert!(
            IterationResult::Failed {
                message: "x".to_string()
            }
            .is_failed()
        );
        let timed_out = IterationResult::Captured {
            outcome: CompletionOutcome::Timeout,
            record: serde_json::Value::Null,
        };
        assert_eq!(timed_out.label(), "timeout");
        assert!(!timed_out.is_failed());
    }
}
