//! Completion Detector - waits for the target to settle after a commit
//!
//! Polls the target's four status signals on a fixed interval and feeds each
//! reading through [`DetectorState::step`]. Resolves exactly once per call.

mod state;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::retry::{RetryPolicy, perform_and_confirm};
use crate::target::{SignalSource, TargetError};

pub use state::{CompletionOutcome, DetectorState, Limits, Observation};

/// Detector timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Budget for the first transition in normal mode
    #[serde(rename = "initial-timeout-ms")]
    pub initial_timeout_ms: u64,

    /// Budget for the first transition in deep mode
    #[serde(rename = "deep-initial-timeout-ms")]
    pub deep_initial_timeout_ms: u64,

    /// Hard ceiling on any single wait
    #[serde(rename = "absolute-ceiling-ms")]
    pub absolute_ceiling_ms: u64,

    /// Log "still processing" every N polls while transitioning
    #[serde(rename = "progress-log-every")]
    pub progress_log_every: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 150,
            initial_timeout_ms: 20_000,
            deep_initial_timeout_ms: 120_000,
            absolute_ceiling_ms: 300_000,
            progress_log_every: 20,
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitOptions {
    pub initial_timeout: Duration,

    /// Ignore success/empty until a transition has been seen
    pub require_transition: bool,

    /// Short-circuit to `NoResult` as soon as the no-result marker shows
    pub watch_no_result: bool,
}

/// What a completion wait observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionReport {
    pub outcome: CompletionOutcome,
    pub elapsed: Duration,
    pub polls: u32,
    pub observed_transition: bool,
}

/// Polling completion detector
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    config: DetectorConfig,
    refresh_policy: RetryPolicy,
}

impl CompletionDetector {
    pub fn new(config: DetectorConfig, refresh_policy: RetryPolicy) -> Self {
        debug!(?config, "CompletionDetector::new: called");
        Self { config, refresh_policy }
    }

    /// Options for a normal or deep-mode wait
    pub fn options(&self, deep_mode: bool, require_transition: bool, watch_no_result: bool) -> AwaitOptions {
        let initial_timeout_ms = if deep_mode {
            self.config.deep_initial_timeout_ms
        } else {
            self.config.initial_timeout_ms
        };
        AwaitOptions {
            initial_timeout: Duration::from_millis(initial_timeout_ms),
            require_transition,
            watch_no_result,
        }
    }

    fn limits(&self, options: &AwaitOptions) -> Limits {
        Limits {
            initial_timeout: options.initial_timeout,
            absolute_ceiling: Duration::from_millis(self.config.absolute_ceiling_ms),
            require_transition: options.require_transition,
        }
    }

    /// Poll until the target settles, the initial budget lapses without any
    /// transition, or the absolute ceiling is hit
    pub async fn await_completion(&self, signals: &dyn SignalSource, options: &AwaitOptions) -> CompletionReport {
        debug!(?options, "await_completion: called");
        let limits = self.limits(options);
        let started = Instant::now();

        let mut interval = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = DetectorState::Unknown;
        let mut polls: u32 = 0;
        let mut refresh_fired = false;
        let mut stale_logged = false;

        loop {
            interval.tick().await;
            polls += 1;

            if options.watch_no_result && probe("has_no_result", signals.has_no_result().await) {
                debug!(polls, "await_completion: no-result marker present");
                return CompletionReport {
                    outcome: CompletionOutcome::NoResult,
                    elapsed: started.elapsed(),
                    polls,
                    observed_transition: state.has_observed_transition(),
                };
            }

            let obs = observe(signals).await;

            if obs.outdated && !refresh_fired {
                refresh_fired = true;
                info!("Target reports outdated results, requesting refresh");
                if self.refresh_policy.enabled {
                    let refreshed = perform_and_confirm(
                        &self.refresh_policy,
                        move || signals.trigger_refresh(),
                        move || async move { Ok(signals.is_updating().await? || !signals.is_outdated().await?) },
                    )
                    .await;
                    if !refreshed {
                        warn!("Refresh was not confirmed, continuing to poll");
                    }
                } else if let Err(e) = signals.trigger_refresh().await {
                    // Single unconfirmed press
                    warn!(error = %e, "Refresh failed, continuing to poll");
                }
            }

            let next = state.step(obs, started.elapsed(), &limits);

            match (&state, &next) {
                (DetectorState::Unknown, DetectorState::Transitioning { .. }) => {
                    debug!(polls, ?obs, "await_completion: transition observed");
                }
                (DetectorState::Unknown, DetectorState::Unknown) if (obs.success || obs.empty) && !stale_logged => {
                    stale_logged = true;
                    debug!(?obs, "await_completion: ignoring result left over from a previous run");
                }
                (_, DetectorState::Transitioning { polls: p })
                    if self.config.progress_log_every > 0 && p % self.config.progress_log_every == 0 =>
                {
                    info!(elapsed = ?started.elapsed(), "Target still processing");
                }
                _ => {}
            }
            state = next;

            if let Some(outcome) = state.outcome() {
                let report = CompletionReport {
                    outcome,
                    elapsed: started.elapsed(),
                    polls,
                    observed_transition: state.has_observed_transition(),
                };
                if outcome == CompletionOutcome::Timeout {
                    warn!(elapsed = ?report.elapsed, observed_transition = report.observed_transition, "Completion wait timed out");
                } else {
                    debug!(?report, "await_completion: resolved");
                }
                return report;
            }
        }
    }
}

/// Read a probe, treating a failed read as "not set"
fn probe(name: &str, reading: Result<bool, TargetError>) -> bool {
    reading.unwrap_or_else(|e| {
        warn!(probe = name, error = %e, "Signal probe failed");
        false
    })
}

async fn observe(signals: &dyn SignalSource) -> Observation {
    Observation {
        updating: probe("is_updating", signals.is_updating().await),
        outdated: probe("is_outdated", signals.is_outdated().await),
        success: probe("is_success", signals.is_success().await),
        empty: probe("is_empty", signals.is_empty().await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Signals scripted as a function of elapsed time since creation
    struct Scripted {
        start: Instant,
        script: Box<dyn Fn(Duration) -> (Observation, bool) + Send + Sync>,
        refreshes: AtomicU32,
        refreshed_at: Mutex<Option<Duration>>,
    }

    impl Scripted {
        fn new(script: impl Fn(Duration) -> (Observation, bool) + Send + Sync + 'static) -> Self {
            Self {
                start: Instant::now(),
                script: Box::new(script),
                refreshes: AtomicU32::new(0),
                refreshed_at: Mutex::new(None),
            }
        }

        fn now(&self) -> (Observation, bool) {
            (self.script)(self.start.elapsed())
        }
    }

    #[async_trait]
    impl SignalSource for Scripted {
        async fn is_updating(&self) -> Result<bool, TargetError> {
            Ok(self.now().0.updating)
        }
        async fn is_outdated(&self) -> Result<bool, TargetError> {
            let outdated = self.now().0.outdated;
            Ok(outdated && self.refreshed_at.lock().unwrap().is_none())
        }
        async fn is_success(&self) -> Result<bool, TargetError> {
            Ok(self.now().0.success)
        }
        async fn is_empty(&self) -> Result<bool, TargetError> {
            Ok(self.now().0.empty)
        }
        async fn has_no_result(&self) -> Result<bool, TargetError> {
            Ok(self.now().1)
        }
        async fn trigger_refresh(&self) -> Result<(), TargetError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            *self.refreshed_at.lock().unwrap() = Some(self.start.elapsed());
            Ok(())
        }
    }

    fn detector(initial_timeout_ms: u64) -> CompletionDetector {
        CompletionDetector::new(
            DetectorConfig {
                poll_interval_ms: 100,
                initial_timeout_ms,
                deep_initial_timeout_ms: initial_timeout_ms * 10,
                absolute_ceiling_ms: 300_000,
                progress_log_every: 20,
            },
            RetryPolicy::default(),
        )
    }

    fn strict(d: &CompletionDetector) -> AwaitOptions {
        d.options(false, true, false)
    }

    const MS: Duration = Duration::from_millis(1);

    #[tokio::test(start_paused = true)]
    async fn test_stale_success_never_resolves_before_timeout() {
        let signals = Scripted::new(|_| {
            (
                Observation {
                    success: true,
                    ..Default::default()
                },
                false,
            )
        });
        let d = detector(2_000);

        let report = d.await_completion(&signals, &strict(&d)).await;

        assert_eq!(report.outcome, CompletionOutcome::Timeout);
        assert!(!report.observed_transition);
        assert!(report.elapsed >= 2_000 * MS);
        assert!(report.elapsed < 2_200 * MS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_updating_resolves() {
        // stale success, then updating, then fresh success
        let signals = Scripted::new(|t| {
            let obs = if t < 300 * MS {
                Observation {
                    success: true,
                    ..Default::default()
                }
            } else if t < 1_000 * MS {
                Observation {
                    updating: true,
                    ..Default::default()
                }
            } else {
                Observation {
                    success: true,
                    ..Default::default()
                }
            };
            (obs, false)
        });
        let d = detector(5_000);

        let report = d.await_completion(&signals, &strict(&d)).await;

        assert_eq!(report.outcome, CompletionOutcome::Success);
        assert!(report.observed_transition);
        assert!(report.elapsed >= 1_000 * MS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_timeout_disabled_once_transitioning() {
        // updating for 60s, far past the 2s initial budget
        let signals = Scripted::new(|t| {
            let obs = if t < 60_000 * MS {
                Observation {
                    updating: true,
                    ..Default::default()
                }
            } else {
                Observation {
                    empty: true,
                    ..Default::default()
                }
            };
            (obs, false)
        });
        let d = detector(2_000);

        let report = d.await_completion(&signals, &strict(&d)).await;

        assert_eq!(report.outcome, CompletionOutcome::Empty);
        assert!(report.elapsed >= 60_000 * MS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_ceiling_ends_endless_processing() {
        let signals = Scripted::new(|_| {
            (
                Observation {
                    updating: true,
                    ..Default::default()
                },
                false,
            )
        });
        let d = detector(2_000);

        let report = d.await_completion(&signals, &strict(&d)).await;

        assert_eq!(report.outcome, CompletionOutcome::Timeout);
        assert!(report.observed_transition);
        assert!(report.elapsed >= 300_000 * MS);
        assert!(report.elapsed < 301_000 * MS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waived_transition_accepts_first_success() {
        let signals = Scripted::new(|_| {
            (
                Observation {
                    success: true,
                    ..Default::default()
                },
                false,
            )
        });
        let d = detector(2_000);

        let report = d.await_completion(&signals, &d.options(false, false, false)).await;

        assert_eq!(report.outcome, CompletionOutcome::Success);
        assert_eq!(report.polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_result_marker_short_circuits() {
        let signals = Scripted::new(|t| (Observation::default(), t >= 250 * MS));
        let d = detector(5_000);

        let report = d.await_completion(&signals, &d.options(false, true, true)).await;

        assert_eq!(report.outcome, CompletionOutcome::NoResult);
        assert!(report.elapsed < 500 * MS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outdated_triggers_single_refresh() {
        // outdated until refreshed (scripted in is_outdated), then updating, then success
        let signals = Scripted::new(|t| {
            let obs = if t < 2_000 * MS {
                Observation {
                    outdated: true,
                    ..Default::default()
                }
            } else if t < 3_000 * MS {
                Observation {
                    updating: true,
                    ..Default::default()
                }
            } else {
                Observation {
                    success: true,
                    ..Default::default()
                }
            };
            (obs, false)
        });
        let d = detector(10_000);

        let report = d.await_completion(&signals, &strict(&d)).await;

        assert_eq!(report.outcome, CompletionOutcome::Success);
        assert_eq!(signals.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_refresh_policy_still_refreshes_once() {
        let signals = Scripted::new(|t| {
            let obs = if t < 1_000 * MS {
                Observation {
                    outdated: true,
                    ..Default::default()
                }
            } else if t < 2_000 * MS {
                Observation {
                    updating: true,
                    ..Default::default()
                }
            } else {
                Observation {
                    success: true,
                    ..Default::default()
                }
            };
            (obs, false)
        });
        let d = CompletionDetector::new(
            DetectorConfig {
                poll_interval_ms: 100,
                ..DetectorConfig::default()
            },
            RetryPolicy {
                enabled: false,
                ..RetryPolicy::default()
            },
        );

        let report = d.await_completion(&signals, &strict(&d)).await;

        assert_eq!(report.outcome, CompletionOutcome::Success);
        assert_eq!(signals.refreshes.load(Ordering::SeqCst), 1);
        assert!(report.elapsed < 3_000 * MS);
    }

    #[test]
    fn test_deep_mode_uses_longer_budget() {
        let d = detector(1_000);
        assert_eq!(d.options(false, true, false).initial_timeout, 1_000 * MS);
        assert_eq!(d.options(true, true, false).initial_timeout, 10_000 * MS);
    }

    #[test]
    fn test_config_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.poll_interval_ms, 150);
        assert_eq!(config.absolute_ceiling_ms, 300_000);
        assert!(config.deep_initial_timeout_ms > config.initial_timeout_ms);
    }
}
