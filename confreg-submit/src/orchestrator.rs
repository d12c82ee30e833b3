//! Submission Orchestrator
//!
//! Single entry point tying the pipeline together:
//!
//! ```text
//! Start ──ok──▶ DeliveredPrimary (spawn notifier)
//!   │fail
//!   ▼
//! TryFallbacks ──ok──▶ DeliveredFallback(channel)
//!   │fail
//!   ▼
//! QueueLocally ──────▶ QueuedLocal
//! ```
//!
//! `submit` and `resync` never fail: every error is logged and folded into a
//! [`DeliveryOutcome`] or [`ResyncSummary`]. No state is retried after a
//! terminal outcome; queued records wait for an explicit resync.

use confreg_common::registration::StoredRegistration;
use confreg_common::RegistrationRecord;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::fallback::FallbackChain;
use crate::notifier::{spawn_notification, Notifier};
use crate::primary::{PrimaryStore, PrimarySubmitter};
use crate::queue_store::{QueueStore, QueuedRecord};

/// Method tag reported for locally queued registrations
pub const LOCAL_STORAGE_METHOD: &str = "local-storage";

/// Method tag reported for primary store deliveries
pub const PRIMARY_METHOD: &str = "primary";

/// Terminal state of one submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    DeliveredPrimary { records: Vec<StoredRegistration> },
    DeliveredFallback { channel: String },
    QueuedLocal { record: QueuedRecord },
}

impl DeliveryOutcome {
    /// Delivery method tag: `primary`, the channel name, or `local-storage`
    pub fn method(&self) -> &str {
        match self {
            DeliveryOutcome::DeliveredPrimary { .. } => PRIMARY_METHOD,
            DeliveryOutcome::DeliveredFallback { channel } => channel,
            DeliveryOutcome::QueuedLocal { .. } => LOCAL_STORAGE_METHOD,
        }
    }

    /// Message shown to the attendee
    pub fn user_message(&self) -> String {
        match self {
            DeliveryOutcome::DeliveredPrimary { .. } => {
                "Registration successful! Thank you for registering.".to_string()
            }
            DeliveryOutcome::DeliveredFallback { channel } => format!(
                "Registration submitted successfully via {}. You'll receive a confirmation shortly.",
                channel
            ),
            DeliveryOutcome::QueuedLocal { .. } => "Registration saved locally! Your data is secure \
                 and will be submitted when connection is restored."
                .to_string(),
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, DeliveryOutcome::QueuedLocal { .. })
    }
}

/// Result of one resync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResyncSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// The submission reliability pipeline
#[derive(Clone)]
pub struct RegistrationPipeline {
    primary: PrimarySubmitter,
    store: Arc<dyn PrimaryStore>,
    fallbacks: FallbackChain,
    queue: Arc<dyn QueueStore>,
    notifier: Arc<dyn Notifier>,
    /// Confirmation triggers still in flight, for short-lived callers
    notifications: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RegistrationPipeline {
    /// `store` must be the same store `primary` writes to; resync uses it
    /// directly for single-attempt inserts.
    pub fn new(
        primary: PrimarySubmitter,
        store: Arc<dyn PrimaryStore>,
        fallbacks: FallbackChain,
        queue: Arc<dyn QueueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            primary,
            store,
            fallbacks,
            queue,
            notifier,
            notifications: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn queue(&self) -> &Arc<dyn QueueStore> {
        &self.queue
    }

    pub fn fallbacks(&self) -> &FallbackChain {
        &self.fallbacks
    }

    /// Deliver one registration. Always returns one of the three outcomes.
    pub async fn submit(&self, record: RegistrationRecord) -> DeliveryOutcome {
        let submission_id = Uuid::new_v4();
        let span = tracing::info_span!("submission", id = %submission_id, email = %record.email);
        self.submit_inner(record).instrument(span).await
    }

    async fn submit_inner(&self, record: RegistrationRecord) -> DeliveryOutcome {
        info!("Attempting to submit registration");

        match self.primary.submit(&record).await {
            Ok(records) => {
                if let Some(first) = records.first() {
                    // Detached: the caller never waits on the email
                    let handle = spawn_notification(self.notifier.clone(), first.id.to_string());
                    let mut in_flight = self.notifications.lock().await;
                    in_flight.retain(|h| !h.is_finished());
                    in_flight.push(handle);
                } else {
                    warn!("Primary store returned no rows, skipping confirmation email");
                }
                return DeliveryOutcome::DeliveredPrimary { records };
            }
            Err(e) => {
                warn!(error = %e, "Primary store failed, trying alternative submission methods");
            }
        }

        let report = self.fallbacks.attempt_all(&record).await;
        if let Some(channel) = report.channel.filter(|_| report.delivered) {
            return DeliveryOutcome::DeliveredFallback { channel };
        }

        let queued = self.queue.enqueue(record).await;
        info!(id = queued.id, "Registration queued locally pending resync");
        DeliveryOutcome::QueuedLocal { record: queued }
    }

    /// Wait up to `timeout` for confirmation triggers spawned by `submit`
    ///
    /// For callers that exit right after submitting (the CLI), since the
    /// runtime shutting down cancels detached tasks. Returns `false` if some
    /// trigger was still running at the deadline; those are left detached.
    pub async fn wait_for_notifications(&self, timeout: Duration) -> bool {
        let handles = std::mem::take(&mut *self.notifications.lock().await);
        if handles.is_empty() {
            return true;
        }

        let count = handles.len();
        let joined = tokio::time::timeout(timeout, async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Confirmation email task did not complete");
                }
            }
        })
        .await;

        match joined {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    count,
                    timeout_ms = timeout.as_millis() as u64,
                    "Gave up waiting for confirmation email trigger"
                );
                false
            }
        }
    }

    /// Re-attempt every queued registration once against the primary store
    ///
    /// Each delivered record leaves the queue immediately; failed ones stay.
    pub async fn resync(&self) -> ResyncSummary {
        let pending = self.queue.list_pending().await;
        let mut summary = ResyncSummary::default();

        if pending.is_empty() {
            return summary;
        }

        info!(count = pending.len(), "Attempting to sync pending registrations");

        for queued in pending {
            let QueuedRecord { record, id, .. } = queued;

            match self.store.insert(&record).await {
                Ok(_) => {
                    summary.succeeded += 1;
                    info!(id, email = %record.email, "Successfully synced registration");

                    if let Err(e) = self.queue.remove_one(id).await {
                        warn!(id, error = %e, "Synced registration could not be removed from queue");
                        summary
                            .errors
                            .push(format!("Synced registration {} but could not dequeue it: {}", id, e));
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(id, email = %record.email, error = %e, "Sync error for registration");
                    summary.errors.push(format!(
                        "Failed to sync registration for {}: {}",
                        record.email, e
                    ));
                }
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Resync finished"
        );
        summary
    }
}
