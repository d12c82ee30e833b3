//! Registration endpoints
//!
//! - `POST /api/registrations`: validate the form and run the pipeline
//! - `POST /api/registrations/resync`: deliver queued registrations
//! - `GET /api/registrations/pending`: inspect the local queue
//! - `GET /api/diagnostics`: network diagnostics

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use confreg_common::RegistrationForm;
use serde::Serialize;
use tracing::info;

use crate::diagnostics::DiagnosticsReport;
use crate::error::{ApiError, ApiResult};
use crate::orchestrator::{DeliveryOutcome, ResyncSummary};
use crate::queue_store::QueuedRecord;
use crate::AppState;

/// Response to an accepted submission
///
/// A registration that could only be queued locally is still a success from
/// the attendee's point of view; `method` tells the page which message to
/// show.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub success: bool,
    pub method: String,
    pub message: String,
    pub outcome: DeliveryOutcome,
}

/// POST /api/registrations
pub async fn submit_registration(
    State(state): State<AppState>,
    form: Result<Json<RegistrationForm>, JsonRejection>,
) -> ApiResult<Json<SubmissionResponse>> {
    let Json(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let record = form
        .validate(state.phone_requirement)
        .map_err(ApiError::Validation)?;

    let outcome = state.pipeline.submit(record).await;
    info!(method = outcome.method(), "Registration submission finished");

    Ok(Json(SubmissionResponse {
        success: true,
        method: outcome.method().to_string(),
        message: outcome.user_message(),
        outcome,
    }))
}

/// POST /api/registrations/resync
pub async fn resync_registrations(State(state): State<AppState>) -> Json<ResyncSummary> {
    Json(state.pipeline.resync().await)
}

/// Queued registrations awaiting resync
#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub count: usize,
    pub registrations: Vec<QueuedRecord>,
}

/// GET /api/registrations/pending
pub async fn list_pending(State(state): State<AppState>) -> Json<PendingResponse> {
    let registrations = state.pipeline.queue().list_pending().await;
    Json(PendingResponse {
        count: registrations.len(),
        registrations,
    })
}

/// GET /api/diagnostics
pub async fn get_diagnostics(State(state): State<AppState>) -> Json<DiagnosticsReport> {
    Json(state.diagnostics.run().await)
}
