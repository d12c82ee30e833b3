//! Post-success Notifier
//!
//! Triggers the ticket/email function after a confirmed primary write. The
//! registration is already recorded at that point, so a failed trigger is
//! logged and nothing else: no fallback, no requeue, no change of outcome.

use async_trait::async_trait;
use confreg_common::store::PostgrestClient;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::DeliveryError;

/// Default serverless function issuing the ticket email
pub const DEFAULT_FUNCTION_NAME: &str = "send-confirmation-email";

/// Ticket/email trigger invoked with the store-assigned registration id
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, registration_id: &str) -> Result<(), DeliveryError>;
}

/// Invokes the confirmation function through the store's functions endpoint
pub struct EdgeFunctionNotifier {
    client: PostgrestClient,
    function_name: String,
}

impl EdgeFunctionNotifier {
    pub fn new(client: PostgrestClient, function_name: impl Into<String>) -> Self {
        Self {
            client,
            function_name: function_name.into(),
        }
    }
}

#[async_trait]
impl Notifier for EdgeFunctionNotifier {
    async fn notify(&self, registration_id: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .invoke_function(
                &self.function_name,
                &json!({ "registration_id": registration_id }),
            )
            .await
            .map_err(|e| DeliveryError::NotifierFailure(e.to_string()))?;

        tracing::debug!(response = %response, "Confirmation function response");
        Ok(())
    }
}

/// Notifier used when confirmation emails are switched off
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, registration_id: &str) -> Result<(), DeliveryError> {
        tracing::debug!(registration_id, "Confirmation emails disabled, skipping");
        Ok(())
    }
}

/// Fire-and-forget: spawn the trigger on its own task and return at once
///
/// The returned handle lets short-lived callers wait for completion before
/// the runtime shuts down.
pub fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    registration_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.notify(&registration_id).await {
            Ok(()) => info!(registration_id = %registration_id, "Confirmation email triggered"),
            Err(e) => warn!(
                registration_id = %registration_id,
                error = %e,
                "Failed to send confirmation email"
            ),
        }
    })
}
