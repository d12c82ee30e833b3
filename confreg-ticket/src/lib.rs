//! confreg-ticket library - confirmation email and ticket service
//!
//! Invoked by confreg-submit after a registration reaches the primary store.

use axum::Router;
use confreg_common::store::PostgrestClient;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;
pub mod mailer;
pub mod ticket;

use mailer::Mailer;
use ticket::TicketSettings;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Store client authorized with the service-role key
    pub store: PostgrestClient,
    pub table: String,
    pub mailer: Mailer,
    pub ticket: TicketSettings,
}

impl AppState {
    pub fn new(
        store: PostgrestClient,
        table: impl Into<String>,
        mailer: Mailer,
        ticket: TicketSettings,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            mailer,
            ticket,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::post;

    Router::new()
        .route("/send-confirmation-email", post(api::send_confirmation_email))
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
