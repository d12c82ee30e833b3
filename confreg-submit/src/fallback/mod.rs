//! Fallback Channel Chain
//!
//! Tries alternate delivery channels one at a time, in configured priority
//! order, stopping at the first success. A failing channel never aborts the
//! chain. Channels are never attempted concurrently, so at most one of them
//! records the submission.

pub mod channel;

use confreg_common::RegistrationRecord;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use channel::{ChannelDescriptor, ChannelEncoding, DeliveryChannel, HttpChannel};

use crate::error::DeliveryError;

/// Outcome of one pass over the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackReport {
    pub delivered: bool,
    /// Name of the channel that accepted the record
    pub channel: Option<String>,
    /// Failure descriptions of the channels tried before it
    pub failures: Vec<String>,
}

/// Ordered list of fallback channels
#[derive(Clone, Default)]
pub struct FallbackChain {
    channels: Vec<Arc<dyn DeliveryChannel>>,
}

impl FallbackChain {
    pub fn new(channels: Vec<Arc<dyn DeliveryChannel>>) -> Self {
        Self { channels }
    }

    /// Build HTTP channels from descriptors, sharing one client
    pub fn from_descriptors(
        descriptors: &[ChannelDescriptor],
        http_client: reqwest::Client,
        default_timeout: Duration,
    ) -> Self {
        let channels = descriptors
            .iter()
            .cloned()
            .map(|descriptor| {
                Arc::new(HttpChannel::new(descriptor, http_client.clone(), default_timeout))
                    as Arc<dyn DeliveryChannel>
            })
            .collect();
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Try each channel in order until one accepts the record
    pub async fn attempt_all(&self, record: &RegistrationRecord) -> FallbackReport {
        let mut failures = Vec::new();

        for channel in &self.channels {
            info!(channel = channel.name(), "Trying fallback submission");

            match channel.deliver(record).await {
                Ok(()) => {
                    info!(channel = channel.name(), "Registration delivered via fallback");
                    return FallbackReport {
                        delivered: true,
                        channel: Some(channel.name().to_string()),
                        failures,
                    };
                }
                Err(e) => {
                    warn!(error = %e, "Fallback channel failed");
                    failures.push(e.to_string());
                }
            }
        }

        warn!(
            error = %DeliveryError::AllChannelsFailed(self.channels.len()),
            "No fallback channel accepted the registration"
        );
        FallbackReport {
            delivered: false,
            channel: None,
            failures,
        }
    }
}
