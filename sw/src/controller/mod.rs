//! Execution Controller - drives one sweep at a time
//!
//! ```text
//!   Idle/Completed ──run──▶ Running ◀──pause(false)── Paused
//!                             │  └─────pause(true)─────▶ │
//!                             │                          │
//!                             └──stop──▶ StopRequested ◀─┘
//!                                             │
//!            last index processed ────────────┴──▶ Completed
//! ```
//!
//! The controller is the only writer of [`RunState`]. Pause and stop arrive
//! on a `watch` channel from any number of [`SweepHandle`]s and are honored
//! at three checkpoints: the top of an iteration, the pause gate, and after
//! the completion wait. An in-flight commit or wait always runs to its own
//! end first.

mod state;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::detector::{AwaitOptions, CompletionDetector, CompletionOutcome, CompletionReport};
use crate::error::SweepError;
use crate::events::{EventBus, EventEmitter, IterationResult};
use crate::recipe::{Combination, SweepRecipe};
use crate::retry::{RetryPolicy, perform_and_confirm};
use crate::space::SweepSpace;
use crate::target::{ActionSurface, ResultCapture, SignalSource, TargetError};

pub use state::{ControlSignal, Phase, RunState};

/// Controller settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Ignore success/empty until the target is seen processing
    #[serde(rename = "require-transition")]
    pub require_transition: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            require_transition: true,
        }
    }
}

/// The three collaborator roles a target plays
#[derive(Clone)]
pub struct Collaborators {
    pub surface: Arc<dyn ActionSurface>,
    pub signals: Arc<dyn SignalSource>,
    pub capture: Arc<dyn ResultCapture>,
}

impl Collaborators {
    /// One object playing every role
    pub fn from_target<T>(target: Arc<T>) -> Self
    where
        T: ActionSurface + SignalSource + ResultCapture + 'static,
    {
        Self {
            surface: target.clone(),
            signals: target.clone(),
            capture: target,
        }
    }
}

/// How a sweep ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub run_id: String,

    /// Indices that produced a progress event
    pub processed: u64,

    /// Of those, how many recorded a failure
    pub failed: u64,

    /// Ended by a stop request rather than running out of indices
    pub stopped: bool,

    /// First index not processed; resume here
    pub next_index: u64,
}

/// Cloneable remote control for a [`Sweeper`]
#[derive(Clone)]
pub struct SweepHandle {
    control: Arc<watch::Sender<ControlSignal>>,
    state: watch::Receiver<RunState>,
}

impl SweepHandle {
    /// Request a pause (true) or a resume (false)
    pub fn pause(&self, paused: bool) {
        info!(paused, "Pause requested");
        self.control.send_modify(|c| c.paused = paused);
    }

    /// Request the sweep to end at its next checkpoint
    pub fn stop(&self) {
        info!("Stop requested");
        self.control.send_modify(|c| c.stop = true);
    }

    /// Snapshot of the run state
    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }
}

/// Releases the controller if a run is dropped before its normal exit
struct ActiveRun<'a> {
    state: &'a watch::Sender<RunState>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|s| {
            if !s.phase.is_active() {
                return false;
            }
            warn!(phase = %s.phase, index = s.current_index, "Sweep abandoned mid-run");
            s.phase = Phase::Completed;
            true
        });
    }
}

/// Sweep execution context
pub struct Sweeper {
    collaborators: Collaborators,
    bus: Arc<EventBus>,
    detector: CompletionDetector,
    commit_policy: RetryPolicy,
    require_transition: bool,
    control: Arc<watch::Sender<ControlSignal>>,
    state: watch::Sender<RunState>,
}

impl Sweeper {
    pub fn new(collaborators: Collaborators, bus: Arc<EventBus>, config: &Config) -> Self {
        debug!("Sweeper::new: called");
        let (control, _) = watch::channel(ControlSignal::default());
        let (state, _) = watch::channel(RunState::default());
        Self {
            collaborators,
            bus,
            detector: CompletionDetector::new(config.detector.clone(), config.refresh.clone()),
            commit_policy: config.commit.clone(),
            require_transition: config.controller.require_transition,
            control: Arc::new(control),
            state,
        }
    }

    pub fn handle(&self) -> SweepHandle {
        SweepHandle {
            control: self.control.clone(),
            state: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Run a sweep from `recipe.start_index` to the last combination
    ///
    /// Only one sweep may be active at a time. Per-iteration failures are
    /// recorded and skipped; the returned error is only for lifecycle misuse.
    pub async fn run(&self, recipe: &SweepRecipe) -> Result<SweepSummary, SweepError> {
        debug!(name = %recipe.name, start_index = recipe.start_index, "Sweeper::run: called");
        let run_id = recipe.run_id.clone().unwrap_or_else(|| Uuid::now_v7().to_string());
        self.begin(&run_id, recipe.start_index)?;
        let _active = ActiveRun { state: &self.state };

        let space = SweepSpace::new(recipe);
        let total = space.total();
        let emitter = self.bus.emitter_for(&run_id);

        for name in space.skipped() {
            warn!(parameter = %name, "Parameter generates no values, left out of the sweep");
            emitter.warning("recipe", &format!("parameter {} generates no values", name));
        }

        info!(
            %run_id,
            recipe = %recipe.name,
            start_index = recipe.start_index,
            total,
            deep_mode = recipe.deep_mode,
            "Sweep started"
        );
        emitter.sweep_started(&recipe.name, recipe.start_index, total);

        let options = self.detector.options(recipe.deep_mode, self.require_transition, true);
        let mut control = self.control.subscribe();
        let mut summary = SweepSummary {
            run_id: run_id.clone(),
            processed: 0,
            failed: 0,
            stopped: false,
            next_index: recipe.start_index,
        };

        for index in recipe.start_index..total {
            if self.stop_observed(&control) {
                summary.stopped = true;
                break;
            }

            let combination = space.combination(index);

            let paused = control.borrow().paused;
            if paused && !self.wait_while_paused(&mut control, index).await {
                summary.stopped = true;
                break;
            }

            self.state.send_modify(|s| s.current_index = index);
            debug!(index, total, %combination, "run: iteration starting");

            let outcome = match self.apply_and_await(&combination, &options, &emitter).await {
                Ok(report) => {
                    // The commit already happened; the result is simply not recorded
                    if self.stop_observed(&control) {
                        summary.stopped = true;
                        break;
                    }
                    self.collect(&report).await
                }
                Err(e) => Err(e),
            };

            let result = outcome.unwrap_or_else(|e| {
                warn!(index, %combination, error = %e, "Iteration failed, continuing with next index");
                emitter.error("iteration", &format!("index {} ({}): {}", index, combination, e));
                IterationResult::Failed { message: e.to_string() }
            });
            if result.is_failed() {
                summary.failed += 1;
            }
            info!(index, total, result = %result.label(), "Iteration complete");
            emitter.iteration_progress(index, total, combination, result);

            summary.processed += 1;
            summary.next_index = index + 1;
        }

        self.state.send_modify(|s| s.phase = Phase::Completed);
        info!(
            %run_id,
            processed = summary.processed,
            failed = summary.failed,
            stopped = summary.stopped,
            next_index = summary.next_index,
            "Sweep finished"
        );
        emitter.sweep_completed(summary.processed, summary.failed, summary.stopped, summary.next_index);
        Ok(summary)
    }

    /// Claim the controller for a new sweep and clear stale control flags
    fn begin(&self, run_id: &str, start_index: u64) -> Result<(), SweepError> {
        let mut active = None;
        let claimed = self.state.send_if_modified(|s| {
            if s.phase.is_active() {
                active = Some(s.phase);
                return false;
            }
            *s = RunState {
                phase: Phase::Running,
                current_index: start_index,
                run_id: Some(run_id.to_string()),
            };
            true
        });

        if let Some(phase) = active.filter(|_| !claimed) {
            warn!(%phase, "Refusing to start a second sweep");
            return Err(SweepError::AlreadyRunning {
                phase: phase.to_string(),
            });
        }

        self.control.send_replace(ControlSignal::default());
        Ok(())
    }

    fn stop_observed(&self, control: &watch::Receiver<ControlSignal>) -> bool {
        let stop = control.borrow().stop;
        if stop {
            info!("Stop observed, ending sweep");
            self.state.send_modify(|s| s.phase = Phase::StopRequested);
        }
        stop
    }

    /// Block until resumed (true) or stopped (false)
    async fn wait_while_paused(&self, control: &mut watch::Receiver<ControlSignal>, index: u64) -> bool {
        self.state.send_modify(|s| s.phase = Phase::Paused);
        info!(next_index = index, "Sweep paused");

        let stop = match control.wait_for(ControlSignal::releases_pause).await {
            Ok(signal) => signal.stop,
            Err(_) => true,
        };

        if stop {
            info!("Stopped while paused");
            self.state.send_modify(|s| s.phase = Phase::StopRequested);
            return false;
        }

        self.state.send_modify(|s| s.phase = Phase::Running);
        info!(next_index = index, "Sweep resumed");
        true
    }

    /// Apply and commit one combination, then wait for the target to settle
    async fn apply_and_await(
        &self,
        combination: &Combination,
        options: &AwaitOptions,
        emitter: &EventEmitter,
    ) -> Result<CompletionReport, SweepError> {
        debug!(%combination, "apply_and_await: called");
        let surface: &dyn ActionSurface = self.collaborators.surface.as_ref();
        surface.apply_configuration(combination).await?;

        if self.commit_policy.enabled {
            let committed = perform_and_confirm(
                &self.commit_policy,
                move || surface.trigger_commit(),
                move || surface.is_commit_confirmed(),
            )
            .await;
            if !committed {
                return Err(TargetError::Action(format!(
                    "commit not confirmed after {} attempts",
                    self.commit_policy.max_attempts
                ))
                .into());
            }
        }

        let report = self
            .detector
            .await_completion(self.collaborators.signals.as_ref(), options)
            .await;
        if report.outcome == CompletionOutcome::Timeout {
            emitter.warning(
                "completion",
                &format!(
                    "timed out after {}ms (transition observed: {})",
                    report.elapsed.as_millis(),
                    report.observed_transition
                ),
            );
        }
        Ok(report)
    }

    /// Turn a resolved wait into the iteration's recorded result
    async fn collect(&self, report: &CompletionReport) -> Result<IterationResult, SweepError> {
        debug!(outcome = %report.outcome, "collect: called");
        if report.outcome == CompletionOutcome::NoResult || self.collaborators.signals.has_no_result().await? {
            return Ok(IterationResult::NoResult);
        }

        match self.collaborators.capture.capture_result().await {
            Ok(record) => Ok(IterationResult::Captured {
                outcome: report.outcome,
                record,
            }),
            // A timeout proceeds anyway; there may simply be nothing to read
            Err(e) if report.outcome == CompletionOutcome::Timeout => {
                warn!(error = %e, "Nothing to capture after timeout");
                Ok(IterationResult::Captured {
                    outcome: CompletionOutcome::Timeout,
                    record: serde_json::Value::Null,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorConfig;
    use crate::events::SweepEvent;
    use crate::recipe::{ParamKind, ParamValue, ParameterSpec};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    /// What the scripted target does on the Nth apply (0-based)
    #[derive(Default)]
    struct Script {
        pause_at: Option<usize>,
        stop_at: Option<usize>,
        fail_at: Option<usize>,
        no_result_at: Option<usize>,
    }

    /// Settles instantly; acts on the handle from inside `apply_configuration`
    #[derive(Default)]
    struct ScriptedTarget {
        script: Mutex<Script>,
        handle: Mutex<Option<SweepHandle>>,
        applied: Mutex<Vec<Combination>>,
    }

    impl ScriptedTarget {
        fn applied(&self) -> Vec<Combination> {
            self.applied.lock().unwrap().clone()
        }

        fn last_is(&self, at: Option<usize>) -> bool {
            at.is_some_and(|n| n + 1 == self.applied.lock().unwrap().len())
        }
    }

    #[async_trait]
    impl ActionSurface for ScriptedTarget {
        async fn apply_configuration(&self, combination: &Combination) -> Result<(), TargetError> {
            let n = {
                let mut applied = self.applied.lock().unwrap();
                applied.push(combination.clone());
                applied.len() - 1
            };
            let script = self.script.lock().unwrap();
            let handle = self.handle.lock().unwrap().clone();
            if let Some(handle) = handle {
                if script.pause_at == Some(n) {
                    handle.pause(true);
                }
                if script.stop_at == Some(n) {
                    handle.stop();
                }
            }
            if script.fail_at == Some(n) {
                return Err(TargetError::Apply("input rejected".to_string()));
            }
            Ok(())
        }

        async fn trigger_commit(&self) -> Result<(), TargetError> {
            Ok(())
        }

        async fn is_commit_confirmed(&self) -> Result<bool, TargetError> {
            Ok(true)
        }
    }

    #[async_trait]
    impl SignalSource for ScriptedTarget {
        async fn is_updating(&self) -> Result<bool, TargetError> {
            Ok(false)
        }
        async fn is_outdated(&self) -> Result<bool, TargetError> {
            Ok(false)
        }
        async fn is_success(&self) -> Result<bool, TargetError> {
            Ok(true)
        }
        async fn is_empty(&self) -> Result<bool, TargetError> {
            Ok(false)
        }
        async fn has_no_result(&self) -> Result<bool, TargetError> {
            let at = self.script.lock().unwrap().no_result_at;
            Ok(self.last_is(at))
        }
    }

    #[async_trait]
    impl ResultCapture for ScriptedTarget {
        async fn capture_result(&self) -> Result<serde_json::Value, TargetError> {
            Ok(json!({ "applied": self.applied.lock().unwrap().len() }))
        }
    }

    fn fast_config() -> Config {
        Config {
            detector: DetectorConfig {
                poll_interval_ms: 1,
                ..DetectorConfig::default()
            },
            commit: RetryPolicy {
                retry_delay_ms: 0,
                post_act_delay_ms: 0,
                ..RetryPolicy::default()
            },
            controller: ControllerConfig {
                require_transition: false,
            },
            ..Config::default()
        }
    }

    fn recipe(count: i64) -> SweepRecipe {
        SweepRecipe::new(
            "ticks",
            vec![ParameterSpec::new("n", ParamKind::Integer).range(0.0, (count - 1) as f64, 1.0)],
        )
    }

    fn setup(script: Script) -> (Arc<Sweeper>, Arc<ScriptedTarget>, broadcast::Receiver<SweepEvent>) {
        let target = Arc::new(ScriptedTarget {
            script: Mutex::new(script),
            ..Default::default()
        });
        let bus = Arc::new(EventBus::new(256));
        let rx = bus.subscribe();
        let sweeper = Arc::new(Sweeper::new(Collaborators::from_target(target.clone()), bus, &fast_config()));
        *target.handle.lock().unwrap() = Some(sweeper.handle());
        (sweeper, target, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<SweepEvent>) -> Vec<SweepEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn progress_indices(events: &[SweepEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                SweepEvent::IterationProgress { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    fn completions(events: &[SweepEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SweepEvent::SweepCompleted { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_sweep_processes_every_index() {
        let (sweeper, target, mut rx) = setup(Script::default());

        let summary = sweeper.run(&recipe(4)).await.unwrap();

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.failed, 0);
        assert!(!summary.stopped);
        assert_eq!(summary.next_index, 4);
        assert_eq!(sweeper.state().phase, Phase::Completed);

        let events = drain(&mut rx);
        assert_eq!(progress_indices(&events), vec![0, 1, 2, 3]);
        assert_eq!(completions(&events), 1);
        assert_eq!(target.applied()[2].get("n"), Some(&ParamValue::Int(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_paused_processes_nothing_further() {
        let (sweeper, target, mut rx) = setup(Script {
            pause_at: Some(2),
            ..Default::default()
        });
        let handle = sweeper.handle();
        let mut state = handle.subscribe_state();

        let runner = sweeper.clone();
        let task = tokio::spawn(async move { runner.run(&recipe(10)).await });

        state.wait_for(|s| s.phase == Phase::Paused).await.unwrap();
        assert_eq!(handle.state().current_index, 2);
        handle.stop();

        let summary = task.await.unwrap().unwrap();
        assert!(summary.stopped);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.next_index, 3);
        assert_eq!(target.applied().len(), 3);

        let events = drain(&mut rx);
        assert_eq!(progress_indices(&events), vec![0, 1, 2]);
        assert_eq!(completions(&events), 1);
        assert!(matches!(events.last(), Some(SweepEvent::SweepCompleted { stopped: true, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_then_resume_finishes() {
        let (sweeper, _target, mut rx) = setup(Script {
            pause_at: Some(1),
            ..Default::default()
        });
        let handle = sweeper.handle();
        let mut state = handle.subscribe_state();

        let runner = sweeper.clone();
        let task = tokio::spawn(async move { runner.run(&recipe(5)).await });

        state.wait_for(|s| s.phase == Phase::Paused).await.unwrap();
        handle.pause(false);

        let summary = task.await.unwrap().unwrap();
        assert!(!summary.stopped);
        assert_eq!(summary.processed, 5);
        assert_eq!(progress_indices(&drain(&mut rx)), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_iteration_is_recorded_and_skipped() {
        let (sweeper, _target, mut rx) = setup(Script {
            fail_at: Some(1),
            no_result_at: Some(2),
            ..Default::default()
        });

        let summary = sweeper.run(&recipe(3)).await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.failed, 1);

        let events = drain(&mut rx);
        let errors: Vec<&SweepEvent> = events
            .iter()
            .filter(|e| matches!(e, SweepEvent::Error { context, .. } if context == "iteration"))
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], SweepEvent::Error { message, .. } if message.contains("index 1")));

        let results: Vec<IterationResult> = events
            .into_iter()
            .filter_map(|e| match e {
                SweepEvent::IterationProgress { result, .. } => Some(result),
                _ => None,
            })
            .collect();
        assert!(matches!(
            results[0],
            IterationResult::Captured {
                outcome: CompletionOutcome::Success,
                ..
            }
        ));
        assert!(matches!(&results[1], IterationResult::Failed { message } if message.contains("input rejected")));
        assert_eq!(results[2], IterationResult::NoResult);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected_while_active() {
        let (sweeper, _target, _rx) = setup(Script {
            pause_at: Some(0),
            ..Default::default()
        });
        let handle = sweeper.handle();
        let mut state = handle.subscribe_state();

        let runner = sweeper.clone();
        let task = tokio::spawn(async move { runner.run(&recipe(3)).await });
        state.wait_for(|s| s.phase == Phase::Paused).await.unwrap();

        let err = sweeper.run(&recipe(3)).await.unwrap_err();
        assert!(matches!(err, SweepError::AlreadyRunning { ref phase } if phase == "paused"));

        handle.stop();
        assert!(task.await.unwrap().unwrap().stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_releases_controller() {
        let (sweeper, _target, _rx) = setup(Script {
            pause_at: Some(0),
            ..Default::default()
        });
        let handle = sweeper.handle();
        let mut state = handle.subscribe_state();

        let runner = sweeper.clone();
        let task = tokio::spawn(async move { runner.run(&recipe(3)).await });
        state.wait_for(|s| s.phase == Phase::Paused).await.unwrap();

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(sweeper.state().phase, Phase::Completed);

        let summary = sweeper.run(&recipe(3)).await.unwrap();
        assert!(!summary.stopped);
        assert_eq!(summary.processed, 3);
        assert_eq!(sweeper.state().phase, Phase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_wait_leaves_index_for_resume_and_restart_clears_flags() {
        let (sweeper, target, mut rx) = setup(Script {
            stop_at: Some(0),
            ..Default::default()
        });

        let first = sweeper.run(&recipe(3).resume_at(0, "run-a")).await.unwrap();
        assert!(first.stopped);
        assert_eq!(first.processed, 0);
        assert_eq!(first.next_index, 0);
        assert_eq!(first.run_id, "run-a");
        assert_eq!(sweeper.state().phase, Phase::Completed);

        target.script.lock().unwrap().stop_at = None;
        let second = sweeper.run(&recipe(3).resume_at(first.next_index, "run-a")).await.unwrap();
        assert!(!second.stopped);
        assert_eq!(second.processed, 3);

        let events = drain(&mut rx);
        assert_eq!(progress_indices(&events), vec![0, 1, 2]);
        assert_eq!(completions(&events), 2);
        assert!(events.iter().all(|e| e.run_id() == "run-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_run_gets_generated_id() {
        let (sweeper, _target, _rx) = setup(Script::default());
        let summary = sweeper.run(&recipe(1)).await.unwrap();
        assert!(Uuid::parse_str(&summary.run_id).is_ok());
        assert_eq!(sweeper.state().run_id.as_deref(), Some(summary.run_id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_space_completes_immediately() {
        let (sweeper, target, mut rx) = setup(Script::default());
        let empty = SweepRecipe::new("nothing", vec![ParameterSpec::new("n", ParamKind::Integer).range(5.0, 1.0, 1.0)]);

        let summary = sweeper.run(&empty).await.unwrap();
        assert_eq!(summary.processed, 0);
        assert!(target.applied().is_empty());

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, SweepEvent::Warning { .. })));
        assert_eq!(completions(&events), 1);
    }
}
