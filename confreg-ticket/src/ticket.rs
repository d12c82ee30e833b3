//! Ticket issuing
//!
//! A ticket is a short id plus a QR code encoding
//! `{prefix}-TICKET:{ticket_id}:{email}:{first} {last}`. The QR image itself is
//! rendered by an external service; the email embeds its URL.

use chrono::{DateTime, Utc};
use confreg_common::RegistrationRecord;
use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::TicketError;

const TICKET_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TICKET_SUFFIX_LEN: usize = 8;

/// `[ticket]` section: event branding and QR rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketSettings {
    /// Prefix of ticket ids and QR payloads
    pub prefix: String,
    pub event_name: String,
    pub support_email: String,
    /// QR rendering endpoint, called with `size` and `data` query parameters
    pub qr_service_url: String,
    pub qr_size: String,
}

impl Default for TicketSettings {
    fn default() -> Self {
        Self {
            prefix: "CONF2025".to_string(),
            event_name: "Conference 2025".to_string(),
            support_email: "support@example.org".to_string(),
            qr_service_url: "https://api.qrserver.com/v1/create-qr-code/".to_string(),
            qr_size: "300x300".to_string(),
        }
    }
}

/// `{prefix}-XXXXXXXX` with 8 uppercase alphanumerics
pub fn generate_ticket_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TICKET_SUFFIX_LEN)
        .map(|_| TICKET_CHARSET[rng.gen_range(0..TICKET_CHARSET.len())] as char)
        .collect();
    format!("{}-{}", prefix, suffix)
}

/// Text encoded in the QR code
pub fn qr_payload(prefix: &str, ticket_id: &str, record: &RegistrationRecord) -> String {
    format!(
        "{}-TICKET:{}:{}:{}",
        prefix,
        ticket_id,
        record.email,
        record.full_name()
    )
}

/// Image URL on the QR rendering service, payload URL-encoded
pub fn qr_code_url(settings: &TicketSettings, payload: &str) -> Result<String, TicketError> {
    let url = Url::parse_with_params(
        &settings.qr_service_url,
        &[("size", settings.qr_size.as_str()), ("data", payload)],
    )
    .map_err(|e| TicketError::Config(format!("Invalid QR service URL: {}", e)))?;
    Ok(url.into())
}

/// Minimal HTML escaping for values interpolated into the email body
fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Confirmation email subject line
pub fn email_subject(settings: &TicketSettings) -> String {
    format!("Your {} Ticket - Confirmation & QR Code", settings.event_name)
}

/// Confirmation email body
pub fn render_email_html(
    settings: &TicketSettings,
    record: &RegistrationRecord,
    ticket_id: &str,
    qr_url: &str,
    registered_at: Option<DateTime<Utc>>,
) -> String {
    let event = escape_html(&settings.event_name);
    let first_name = escape_html(&record.first_name);
    let full_name = escape_html(&record.full_name());
    let email = escape_html(&record.email);
    let ticket = escape_html(ticket_id);
    let qr = escape_html(qr_url);
    let support = escape_html(&settings.support_email);
    let registered = registered_at
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{event} - Your Ticket</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h1>Your Ticket is Ready!</h1>
  <p>Hello {first_name},</p>
  <p>Thank you for registering for <strong>{event}</strong>.</p>
  <h3>Registration Details</h3>
  <p><strong>Name:</strong> {full_name}</p>
  <p><strong>Email:</strong> {email}</p>
  <p><strong>Ticket ID:</strong> <code>{ticket}</code></p>
  <p><strong>Registration Date:</strong> {registered}</p>
  <div style="text-align: center; margin: 30px 0;">
    <h3>Your QR Code Ticket</h3>
    <p>Present this QR code at the event entrance:</p>
    <img src="{qr}" alt="QR Code Ticket" style="max-width: 250px;">
  </div>
  <ul>
    <li>Save this email and QR code</li>
    <li>Bring a valid ID to the event</li>
    <li>Arrive 30 minutes early for check-in</li>
  </ul>
  <p style="text-align: center; color: #666; font-size: 14px;">
    Questions? Contact us at <a href="mailto:{support}">{support}</a>
  </p>
</body>
</html>
"#
    )
}
