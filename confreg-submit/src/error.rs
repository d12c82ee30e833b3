//! Error types for confreg-submit
//!
//! [`DeliveryError`] is the pipeline's failure taxonomy. None of these escape
//! [`crate::orchestrator::RegistrationPipeline`]: they are logged and folded
//! into a delivery outcome or resync summary. [`ApiError`] is the HTTP layer's
//! error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use confreg_common::registration::ValidationErrors;
use confreg_common::store::StoreError;
use serde_json::json;
use thiserror::Error;

/// Pipeline delivery failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Connectivity probe failed before any write attempt
    #[error("Primary store unreachable: {0}")]
    Unreachable(String),

    /// One primary write attempt failed; recoverable by retry
    #[error("Write attempt {attempt} failed: {source}")]
    TransientWriteFailure { attempt: u32, source: StoreError },

    /// Every bounded retry attempt failed
    #[error("All {attempts} write attempts failed, last error: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: StoreError },

    /// One fallback channel failed; the chain continues
    #[error("Channel '{channel}' failed: {reason}")]
    ChannelFailure { channel: String, reason: String },

    /// Every fallback channel failed
    #[error("All {0} fallback channels failed")]
    AllChannelsFailed(usize),

    /// Local queue write failed; the record is lost
    #[error("Local queue persistence failed: {0}")]
    PersistenceFailure(String),

    /// Post-success ticket/email trigger failed
    #[error("Confirmation trigger failed: {0}")]
    NotifierFailure(String),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Form validation failed (400)
    #[error("Invalid registration: {0}")]
    Validation(ValidationErrors),

    /// Body is not a JSON registration form (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": {
                        "code": "VALIDATION_FAILED",
                        "message": "One or more fields are invalid",
                        "fields": errors,
                    }
                }),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": { "code": "BAD_REQUEST", "message": msg } }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
