//! Service assembly
//!
//! Turns a [`SubmitConfig`] into a ready [`RegistrationPipeline`] plus the
//! [`NetworkDiagnostics`] runner, sharing one primary store client between
//! them. The queue store is passed in so callers choose file or memory.

use confreg_common::{Error, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::SubmitConfig;
use crate::diagnostics::NetworkDiagnostics;
use crate::fallback::FallbackChain;
use crate::notifier::{DisabledNotifier, EdgeFunctionNotifier, Notifier};
use crate::orchestrator::RegistrationPipeline;
use crate::primary::{
    ConnectivityProbe, PrimaryStore, PrimarySubmitter, RestPrimaryStore, TokioSleeper,
};
use crate::queue_store::QueueStore;

const CHANNEL_USER_AGENT: &str = concat!("confreg-submit/", env!("CARGO_PKG_VERSION"));

/// Everything the CLI and HTTP API need
#[derive(Clone)]
pub struct SubmitServices {
    pub pipeline: RegistrationPipeline,
    pub diagnostics: NetworkDiagnostics,
}

/// Build the pipeline and diagnostics from configuration
pub fn build_services(config: &SubmitConfig, queue: Arc<dyn QueueStore>) -> Result<SubmitServices> {
    config.validate()?;
    let settings = config.store_settings()?;

    let rest_store = RestPrimaryStore::new(&settings, config.primary.table.clone())
        .map_err(|e| Error::Config(format!("Primary store client: {}", e)))?;
    let store_client = rest_store.client().clone();
    let store: Arc<dyn PrimaryStore> = Arc::new(rest_store);

    let probe = ConnectivityProbe::new(store.clone(), config.probe_timeout());
    let submitter = PrimarySubmitter::new(
        store.clone(),
        probe.clone(),
        config.retry_policy(),
        Arc::new(TokioSleeper),
    );

    let http_client = reqwest::Client::builder()
        .user_agent(CHANNEL_USER_AGENT)
        .build()
        .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

    let fallbacks = FallbackChain::from_descriptors(
        &config.channels,
        http_client.clone(),
        config.channel_timeout(),
    );

    let notifier: Arc<dyn Notifier> = if config.notifier.enabled {
        Arc::new(EdgeFunctionNotifier::new(
            store_client,
            config.notifier.function.clone(),
        ))
    } else {
        Arc::new(DisabledNotifier)
    };

    info!(
        store = %settings.base_url,
        table = %config.primary.table,
        max_attempts = config.retry_policy().max_attempts,
        channels = ?fallbacks.channel_names(),
        notifier = config.notifier.enabled,
        "Registration pipeline configured"
    );

    let diagnostics = NetworkDiagnostics::new(
        probe,
        settings.base_url.clone(),
        config.diagnostics.external_url.clone(),
        http_client,
        confreg_common::time::millis_to_duration(config.diagnostics.timeout_ms),
    );

    Ok(SubmitServices {
        pipeline: RegistrationPipeline::new(submitter, store, fallbacks, queue, notifier),
        diagnostics,
    })
}
