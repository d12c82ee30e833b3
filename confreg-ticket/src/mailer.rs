//! Transactional email client (Resend-compatible `POST /emails`)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailerError {
    #[error("{0}")]
    Network(String),

    /// Non-success answer; `message` is the API's own explanation if any
    #[error("HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unreadable response: {0}")]
    Parse(String),
}

/// `[email]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub api_base: String,
    /// Overridden by `RESEND_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_ms: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.resend.com".to_string(),
            api_key: None,
            from: "Conference Registration <onboarding@resend.dev>".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmailApiResponse {
    id: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Mailer {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl Mailer {
    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MailerError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailerError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/emails", api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            from: from.into(),
        })
    }

    /// Send one HTML email, returning the provider's message id
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String, MailerError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&OutgoingEmail {
                from: &self.from,
                to: [to],
                subject,
                html,
            })
            .send()
            .await
            .map_err(|e| MailerError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MailerError::Network(e.to_string()))?;
        debug!(status = status.as_u16(), body = %text, "Email API response");

        let parsed: Option<EmailApiResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            return Err(MailerError::Rejected {
                status: status.as_u16(),
                message: parsed
                    .and_then(|r| r.message)
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        parsed
            .and_then(|r| r.id)
            .ok_or_else(|| MailerError::Parse("missing email id".to_string()))
    }
}
