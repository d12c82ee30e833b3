//! confreg-submit library - registration submission pipeline
//!
//! Delivers validated registrations to the primary store, falling back to
//! alternate channels and finally a local queue. The binary wraps this in an
//! HTTP API and a CLI.

use axum::Router;
use confreg_common::PhoneRequirement;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fallback;
pub mod notifier;
pub mod orchestrator;
pub mod primary;
pub mod queue_store;

pub use diagnostics::NetworkDiagnostics;
pub use error::DeliveryError;
pub use orchestrator::{DeliveryOutcome, RegistrationPipeline, ResyncSummary};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: RegistrationPipeline,
    pub diagnostics: NetworkDiagnostics,
    /// Whether the form must carry a phone number
    pub phone_requirement: PhoneRequirement,
}

impl AppState {
    pub fn new(
        pipeline: RegistrationPipeline,
        diagnostics: NetworkDiagnostics,
        phone_requirement: PhoneRequirement,
    ) -> Self {
        Self {
            pipeline,
            diagnostics,
            phone_requirement,
        }
    }
}

/// Build application router
///
/// CORS is permissive: the registration page is served from another origin.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let registrations = Router::new()
        .route("/api/registrations", post(api::submit_registration))
        .route("/api/registrations/resync", post(api::resync_registrations))
        .route("/api/registrations/pending", get(api::list_pending))
        .route("/api/diagnostics", get(api::get_diagnostics));

    Router::new()
        .merge(registrations)
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
