//! confreg-ticket configuration (`confreg-ticket.toml`)
//!
//! The service key and email API key are secrets and normally come from the
//! environment (`SUPABASE_SERVICE_ROLE_KEY`, `RESEND_API_KEY`).

use confreg_common::config::{resolve_setting, LoggingConfig};
use confreg_common::store::StoreSettings;
use confreg_common::{time, Error, Result};
use serde::{Deserialize, Serialize};

use crate::mailer::EmailSettings;
use crate::ticket::TicketSettings;

pub const MODULE_NAME: &str = "confreg-ticket";

/// Store base URL, shared with confreg-submit
pub const STORE_URL_ENV: &str = "CONFREG_STORE_URL";

/// Service-role key: the ticket service must read and patch any row
pub const SERVICE_KEY_ENV: &str = "SUPABASE_SERVICE_ROLE_KEY";

pub const EMAIL_KEY_ENV: &str = "RESEND_API_KEY";

pub const DEFAULT_PORT: u16 = 5781;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub email: EmailSettings,
    pub ticket: TicketSettings,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            email: EmailSettings::default(),
            ticket: TicketSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
    pub table: String,
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            table: "registrations".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl TicketConfig {
    pub fn store_settings(&self) -> Result<StoreSettings> {
        let base_url = resolve_setting(STORE_URL_ENV, self.store.url.as_deref())
            .ok_or_else(|| missing("store URL", STORE_URL_ENV, "[store] url"))?;
        let api_key = resolve_setting(SERVICE_KEY_ENV, self.store.service_key.as_deref())
            .ok_or_else(|| missing("service key", SERVICE_KEY_ENV, "[store] service_key"))?;

        Ok(StoreSettings {
            base_url,
            api_key,
            request_timeout: time::millis_to_duration(self.store.request_timeout_ms),
        })
    }

    pub fn email_api_key(&self) -> Result<String> {
        resolve_setting(EMAIL_KEY_ENV, self.email.api_key.as_deref())
            .ok_or_else(|| missing("email API key", EMAIL_KEY_ENV, "[email] api_key"))
    }
}

fn missing(what: &str, env_var: &str, toml_key: &str) -> Error {
    Error::Config(format!(
        "Missing {} (set {} or {})",
        what, env_var, toml_key
    ))
}
