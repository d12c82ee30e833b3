//! Primary Submitter
//!
//! Writes one registration to the primary store, masking transient failures
//! with a bounded retry loop.
//!
//! **Algorithm:**
//! 1. Run the connectivity probe; unreachable → fail without any write
//! 2. Attempt the insert up to `max_attempts` times
//! 3. After failed attempt `n` (1-based, not the last): sleep `base_delay * 2^n`
//! 4. Success → stored rows; all attempts failed → `ExhaustedRetries`
//!
//! With the default 1 s base the waits are 2 s, 4 s, ... so worst-case
//! latency is bounded by the probe timeout plus `max_attempts` request
//! timeouts plus the backoff sum.

use async_trait::async_trait;
use confreg_common::registration::StoredRegistration;
use confreg_common::RegistrationRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ConnectivityProbe, PrimaryStore};
use crate::error::DeliveryError;

/// Bounded retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
    /// Backoff unit; the wait after attempt `n` is `base_delay * 2^n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Sleep seam so tests can observe the backoff schedule without waiting
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeping via the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Primary store writer with probe + bounded retry
#[derive(Clone)]
pub struct PrimarySubmitter {
    store: Arc<dyn PrimaryStore>,
    probe: ConnectivityProbe,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl PrimarySubmitter {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        probe: ConnectivityProbe,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            store,
            probe,
            policy,
            sleeper,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Probe, then insert with retry. Failures always propagate as
    /// [`DeliveryError::Unreachable`] or [`DeliveryError::ExhaustedRetries`].
    pub async fn submit(
        &self,
        record: &RegistrationRecord,
    ) -> Result<Vec<StoredRegistration>, DeliveryError> {
        let report = self.probe.check().await;
        if !report.reachable {
            warn!(
                detail = %report.detail,
                elapsed_ms = report.elapsed_ms,
                "Primary store connectivity test failed"
            );
            return Err(DeliveryError::Unreachable(report.detail));
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_attempts, "Primary store submission attempt");

            let err = match self.store.insert(record).await {
                Ok(rows) => {
                    info!(attempt, rows = rows.len(), "Primary store submission successful");
                    return Ok(rows);
                }
                Err(err) => err,
            };

            let failure = DeliveryError::TransientWriteFailure {
                attempt,
                source: err.clone(),
            };

            if attempt >= max_attempts {
                warn!(error = %failure, "Final primary store attempt failed");
                return Err(DeliveryError::ExhaustedRetries {
                    attempts: attempt,
                    last_error: err,
                });
            }

            let backoff = self.policy.delay_for_attempt(attempt);
            warn!(
                error = %failure,
                backoff_ms = backoff.as_millis() as u64,
                "Primary store write failed, will retry after backoff"
            );
            self.sleeper.sleep(backoff).await;
        }
    }
}
