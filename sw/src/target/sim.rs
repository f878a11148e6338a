//! SimulatedTarget - an in-process stand-in for a real backtesting surface
//!
//! Behaves like the real thing where it matters to the engine: commits can be
//! lost, processing takes a variable amount of time, the previous result stays
//! on display for a moment after a new commit, and some configurations end
//! empty or with no result at all.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::recipe::Combination;

use super::{ActionSurface, ResultCapture, SignalSource, TargetError};

/// Knobs for the simulated target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Base processing time after a commit
    pub latency_ms: u64,

    /// Extra random processing time, 0..=jitter_ms
    pub jitter_ms: u64,

    /// How long the previous result stays displayed after a commit
    pub start_delay_ms: u64,

    /// Commits land in the outdated state and need a refresh
    pub outdated_first: bool,

    /// Probability a commit press is silently lost
    pub commit_failure_rate: f64,

    /// Probability a configuration produces no result
    pub no_result_rate: f64,

    /// Probability a configuration finishes empty
    pub empty_rate: f64,

    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_ms: 400,
            jitter_ms: 200,
            start_delay_ms: 100,
            outdated_first: false,
            commit_failure_rate: 0.1,
            no_result_rate: 0.05,
            empty_rate: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Success,
    Empty,
    NoResult,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Outdated { outcome: Settled },
    Processing { starts_at: Instant, until: Instant, outcome: Settled },
}

struct SimState {
    rng: StdRng,
    phase: Phase,
    /// What the status area currently shows
    shown: Option<Settled>,
    pending: Option<Combination>,
    current: Option<Combination>,
    commit_confirmed: bool,
    applied: Vec<Combination>,
    commit_presses: u32,
}

impl SimState {
    /// Advance the phase to `now`
    fn settle(&mut self, now: Instant) {
        if let Phase::Processing {
            starts_at,
            until,
            outcome,
        } = self.phase
        {
            if now >= until {
                debug!(?outcome, "SimulatedTarget: processing finished");
                self.shown = Some(outcome);
                self.phase = Phase::Idle;
            } else if now >= starts_at {
                self.shown = None;
            }
        }
    }

    fn processing_started(&self, now: Instant) -> bool {
        matches!(self.phase, Phase::Processing { starts_at, .. } if now >= starts_at)
    }
}

/// In-process target implementing every collaborator trait
pub struct SimulatedTarget {
    config: SimulationConfig,
    state: Mutex<SimState>,
}

impl SimulatedTarget {
    pub fn new(config: SimulationConfig) -> Self {
        debug!(?config, "SimulatedTarget::new: called");
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: Mutex::new(SimState {
                rng,
                phase: Phase::Idle,
                shown: None,
                pending: None,
                current: None,
                commit_confirmed: false,
                applied: Vec::new(),
                commit_presses: 0,
            }),
        }
    }

    /// Every combination applied so far, in order
    pub async fn applied(&self) -> Vec<Combination> {
        self.state.lock().await.applied.clone()
    }

    /// Number of commit presses (including lost ones)
    pub async fn commit_presses(&self) -> u32 {
        self.state.lock().await.commit_presses
    }

    fn processing(&self, rng: &mut StdRng, now: Instant, outcome: Settled) -> Phase {
        let jitter = if self.config.jitter_ms > 0 {
            rng.random_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        Phase::Processing {
            starts_at: now + Duration::from_millis(self.config.start_delay_ms),
            until: now + Duration::from_millis(self.config.start_delay_ms + self.config.latency_ms + jitter),
            outcome,
        }
    }

    fn draw_outcome(&self, rng: &mut StdRng) -> Settled {
        if rng.random_bool(self.config.no_result_rate.clamp(0.0, 1.0)) {
            Settled::NoResult
        } else if rng.random_bool(self.config.empty_rate.clamp(0.0, 1.0)) {
            Settled::Empty
        } else {
            Settled::Success
        }
    }
}

/// Deterministic synthetic metrics for a combination
fn synthetic_metrics(combination: &Combination) -> serde_json::Value {
    let mut hasher = DefaultHasher::new();
    combination.to_string().hash(&mut hasher);
    let h = hasher.finish();

    let trades = 20 + (h % 480);
    let win_rate = ((h >> 12) % 10_000) as f64 / 100.0;
    let net_profit = ((h >> 24) % 200_000) as f64 / 10.0 - 5_000.0;
    let max_drawdown = ((h >> 40) % 50_000) as f64 / 10.0;

    json!({
        "net_profit": net_profit,
        "total_trades": trades,
        "win_rate_pct": win_rate,
        "max_drawdown": max_drawdown,
    })
}

#[async_trait]
impl ActionSurface for SimulatedTarget {
    async fn apply_configuration(&self, combination: &Combination) -> Result<(), TargetError> {
        debug!(%combination, "SimulatedTarget::apply_configuration: called");
        let mut state = self.state.lock().await;
        state.pending = Some(combination.clone());
        state.applied.push(combination.clone());
        state.commit_confirmed = false;
        Ok(())
    }

    async fn trigger_commit(&self) -> Result<(), TargetError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.commit_presses += 1;

        if state.commit_confirmed {
            debug!("SimulatedTarget::trigger_commit: already committed");
            return Ok(());
        }
        let Some(combination) = state.pending.take() else {
            return Err(TargetError::Action("nothing to commit".to_string()));
        };
        if state.rng.random_bool(self.config.commit_failure_rate.clamp(0.0, 1.0)) {
            debug!("SimulatedTarget::trigger_commit: press lost");
            state.pending = Some(combination);
            return Ok(());
        }

        let now = Instant::now();
        let outcome = self.draw_outcome(&mut state.rng);
        state.phase = if self.config.outdated_first {
            Phase::Outdated { outcome }
        } else {
            self.processing(&mut state.rng, now, outcome)
        };
        // The empty-state marker belongs to the previous configuration
        if state.shown == Some(Settled::NoResult) {
            state.shown = None;
        }
        state.current = Some(combination);
        state.commit_confirmed = true;
        debug!(?outcome, "SimulatedTarget::trigger_commit: committed");
        Ok(())
    }

    async fn is_commit_confirmed(&self) -> Result<bool, TargetError> {
        Ok(self.state.lock().await.commit_confirmed)
    }
}

#[async_trait]
impl SignalSource for SimulatedTarget {
    async fn is_updating(&self) -> Result<bool, TargetError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.settle(now);
        Ok(state.processing_started(now))
    }

    async fn is_outdated(&self) -> Result<bool, TargetError> {
        let mut state = self.state.lock().await;
        state.settle(Instant::now());
        Ok(matches!(state.phase, Phase::Outdated { .. }))
    }

    async fn is_success(&self) -> Result<bool, TargetError> {
        let mut state = self.state.lock().await;
        state.settle(Instant::now());
        Ok(state.shown == Some(Settled::Success))
    }

    async fn is_empty(&self) -> Result<bool, TargetError> {
        let mut state = self.state.lock().await;
        state.settle(Instant::now());
        Ok(state.shown == Some(Settled::Empty))
    }

    async fn has_no_result(&self) -> Result<bool, TargetError> {
        let mut state = self.state.lock().await;
        state.settle(Instant::now());
        Ok(state.shown == Some(Settled::NoResult))
    }

    async fn trigger_refresh(&self) -> Result<(), TargetError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if let Phase::Outdated { outcome } = state.phase {
            debug!("SimulatedTarget::trigger_refresh: starting processing");
            let now = Instant::now();
            state.phase = self.processing(&mut state.rng, now, outcome);
        }
        Ok(())
    }
}

#[async_trait]
impl ResultCapture for SimulatedTarget {
    async fn capture_result(&self) -> Result<serde_json::Value, TargetError> {
        let mut state = self.state.lock().await;
        state.settle(Instant::now());
        let combination = state
            .current
            .clone()
            .ok_or_else(|| TargetError::Capture("nothing has been committed".to_string()))?;

        match state.shown {
            Some(Settled::Success) => Ok(synthetic_metrics(&combination)),
            Some(Settled::Empty) => Ok(json!({ "total_trades": 0 })),
            _ => Err(TargetError::Capture("no settled result on display".to_string())),
        }
    }
}
