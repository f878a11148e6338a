//! Confirm-retry: perform an action, verify it took, retry if it did not

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::target::TargetError;

/// How hard to try an act-and-confirm step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Disabled policies report failure without acting
    pub enabled: bool,

    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Wait after a failed confirmation before acting again
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Wait between acting and checking the effect
    #[serde(rename = "post-act-delay-ms")]
    pub post_act_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            retry_delay_ms: 500,
            post_act_delay_ms: 300,
        }
    }
}

impl RetryPolicy {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn post_act_delay(&self) -> Duration {
        Duration::from_millis(self.post_act_delay_ms)
    }
}

/// Invoke `act`, wait, check `is_confirmed`; repeat up to `max_attempts` times
///
/// Returns true as soon as a confirmation holds, false when the policy is
/// disabled or every attempt went unconfirmed. `act` may run up to
/// `max_attempts` times, so it must be safe to repeat. Errors from either
/// closure count as an unconfirmed attempt.
pub async fn perform_and_confirm<A, AF, C, CF>(policy: &RetryPolicy, mut act: A, mut is_confirmed: C) -> bool
where
    A: FnMut() -> AF,
    AF: Future<Output = Result<(), TargetError>>,
    C: FnMut() -> CF,
    CF: Future<Output = Result<bool, TargetError>>,
{
    debug!(?policy, "perform_and_confirm: called");
    if !policy.enabled {
        debug!("perform_and_confirm: policy disabled");
        return false;
    }

    for attempt in 1..=policy.max_attempts {
        if let Err(e) = act().await {
            warn!(attempt, error = %e, "Action failed");
        }
        tokio::time::sleep(policy.post_act_delay()).await;

        match is_confirmed().await {
            Ok(true) => {
                debug!(attempt, "perform_and_confirm: confirmed");
                return true;
            }
            Ok(false) => {
                debug!(attempt, max = policy.max_attempts, "perform_and_confirm: not confirmed");
            }
            Err(e) => {
                warn!(attempt, error = %e, "Confirmation probe failed");
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.retry_delay()).await;
        }
    }

    warn!(attempts = policy.max_attempts, "Action not confirmed after all attempts");
    false
}
