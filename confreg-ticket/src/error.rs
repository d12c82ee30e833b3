//! Error types for confreg-ticket
//!
//! Every handler error renders as `{ "success": false, "error": "..." }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use confreg_common::store::StoreError;
use serde_json::json;
use thiserror::Error;

use crate::mailer::MailerError;

#[derive(Debug, Error)]
pub enum TicketError {
    /// Malformed request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Registration row does not exist (404)
    #[error("Registration not found: {0}")]
    NotFound(String),

    /// Store lookup failed (502)
    #[error("Failed to fetch registration: {0}")]
    Store(#[from] StoreError),

    /// Email API rejected or never answered (502)
    #[error("Email sending failed: {0}")]
    Email(#[from] MailerError),

    /// Service misconfigured (500)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TicketError {
    pub fn status(&self) -> StatusCode {
        match self {
            TicketError::BadRequest(_) => StatusCode::BAD_REQUEST,
            TicketError::NotFound(_) => StatusCode::NOT_FOUND,
            TicketError::Store(_) | TicketError::Email(_) => StatusCode::BAD_GATEWAY,
            TicketError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
