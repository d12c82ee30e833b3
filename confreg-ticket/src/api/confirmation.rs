//! `POST /send-confirmation-email`
//!
//! Looks up the registration, assigns (or reuses) its ticket id, records the
//! ticket on the row and emails the attendee their QR ticket. The row update
//! is best effort; the email is not.

use axum::{body::Bytes, extract::State, Json};
use confreg_common::registration::StoredRegistration;
use confreg_common::time;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::TicketError;
use crate::ticket::{
    email_subject, generate_ticket_id, qr_code_url, qr_payload, render_email_html,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct ConfirmationRequest {
    #[serde(default, alias = "registrationId")]
    registration_id: Option<Value>,
}

/// Accepts numeric and string ids; blank or other shapes count as missing
fn registration_id(request: &ConfirmationRequest) -> Option<String> {
    match request.registration_id.as_ref()? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct TicketPatch<'a> {
    ticket_id: &'a str,
    ticket_qr_code: &'a str,
    email_sent: bool,
    email_sent_at: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub success: bool,
    pub message: String,
    pub ticket_id: String,
    pub email_id: String,
}

pub async fn send_confirmation_email(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ConfirmationResponse>, TicketError> {
    let request: ConfirmationRequest = serde_json::from_slice(&body)
        .map_err(|_| TicketError::BadRequest("Invalid JSON in request body".to_string()))?;
    let id = registration_id(&request)
        .ok_or_else(|| TicketError::BadRequest("Registration ID is required".to_string()))?;

    info!(registration_id = %id, "Confirmation email requested");

    let row: StoredRegistration = state
        .store
        .select_by_id(&state.table, &id)
        .await?
        .ok_or_else(|| TicketError::NotFound(id.clone()))?;
    let record = &row.record;

    let ticket_id = match &row.ticket_id {
        Some(existing) if !existing.is_empty() => existing.clone(),
        _ => {
            let generated = generate_ticket_id(&state.ticket.prefix);
            info!(registration_id = %id, ticket_id = %generated, "Generated new ticket id");
            generated
        }
    };

    let payload = qr_payload(&state.ticket.prefix, &ticket_id, record);
    let qr_url = qr_code_url(&state.ticket, &payload)?;

    let patch = TicketPatch {
        ticket_id: &ticket_id,
        ticket_qr_code: &qr_url,
        email_sent: true,
        email_sent_at: time::now().to_rfc3339(),
    };
    if let Err(e) = state.store.update_by_id(&state.table, &id, &patch).await {
        warn!(registration_id = %id, error = %e, "Ticket update failed, sending email anyway");
    }

    let html = render_email_html(&state.ticket, record, &ticket_id, &qr_url, row.created_at);
    let email_id = state
        .mailer
        .send(&record.email, &email_subject(&state.ticket), &html)
        .await?;

    info!(registration_id = %id, email_id = %email_id, "Confirmation email sent");

    Ok(Json(ConfirmationResponse {
        success: true,
        message: format!("Email sent successfully to {}!", record.email),
        ticket_id,
        email_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Option<String> {
        registration_id(&serde_json::from_str(body).unwrap())
    }

    #[test]
    fn test_registration_id_shapes() {
        assert_eq!(parse(r#"{"registration_id": 42}"#), Some("42".to_string()));
        assert_eq!(parse(r#"{"registrationId": "abc"}"#), Some("abc".to_string()));
        assert_eq!(parse(r#"{"registration_id": "  "}"#), None);
        assert_eq!(parse(r#"{"registration_id": null}"#), None);
        assert_eq!(parse(r#"{}"#), None);
    }
}
