//! confreg-submit configuration
//!
//! Loaded from `confreg-submit.toml` (see [`confreg_common::config`] for the
//! search order). Every section is optional; missing values fall back to the
//! compiled defaults below. Store URL and key are resolved environment-first
//! through [`SubmitConfig::store_settings`].

use confreg_common::config::{
    config_file_candidates, resolve_setting, write_toml_config, LoggingConfig,
};
use confreg_common::store::StoreSettings;
use confreg_common::{time, Error, PhoneRequirement, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fallback::ChannelDescriptor;
use crate::notifier::DEFAULT_FUNCTION_NAME;
use crate::primary::RetryPolicy;

/// Module name used for root folder and config file resolution
pub const MODULE_NAME: &str = "confreg-submit";

/// Environment variable carrying the primary store base URL
pub const STORE_URL_ENV: &str = "CONFREG_STORE_URL";

/// Environment variable carrying the primary store API key
pub const STORE_KEY_ENV: &str = "CONFREG_STORE_KEY";

/// Default HTTP port of `confreg-submit serve`
pub const DEFAULT_PORT: u16 = 5780;

/// Top-level TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    /// Folder holding `pending_registrations.json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,
    pub phone_requirement: PhoneRequirement,
    /// Default request timeout for fallback channels
    pub channel_timeout_ms: u64,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub primary: PrimaryConfig,
    pub notifier: NotifierConfig,
    pub diagnostics: DiagnosticsConfig,
    /// Fallback channels in priority order
    pub channels: Vec<ChannelDescriptor>,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            phone_requirement: PhoneRequirement::Optional,
            channel_timeout_ms: 10_000,
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            primary: PrimaryConfig::default(),
            notifier: NotifierConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            channels: Vec::new(),
        }
    }
}

/// `[server]` section
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

/// `[primary]` section: hosted store connection and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    /// Base URL; overridden by `CONFREG_STORE_URL`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// API key; overridden by `CONFREG_STORE_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub table: String,
    pub probe_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            table: "registrations".to_string(),
            probe_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            max_attempts: 3,
            backoff_base_ms: 1_000,
        }
    }
}

/// `[notifier]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub function: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            function: DEFAULT_FUNCTION_NAME.to_string(),
        }
    }
}

/// `[diagnostics]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Third-party URL used to tell "store down" from "network down"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            external_url: None,
            timeout_ms: 5_000,
        }
    }
}

impl SubmitConfig {
    /// Store URL and key (env → TOML) plus the request timeout
    pub fn store_settings(&self) -> Result<StoreSettings> {
        let base_url = resolve_setting(STORE_URL_ENV, self.primary.url.as_deref()).ok_or_else(
            || {
                Error::Config(format!(
                    "Primary store URL not configured (set {} or [primary] url)",
                    STORE_URL_ENV
                ))
            },
        )?;
        let api_key = resolve_setting(STORE_KEY_ENV, self.primary.api_key.as_deref())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Primary store API key not configured (set {} or [primary] api_key)",
                    STORE_KEY_ENV
                ))
            })?;

        Ok(StoreSettings {
            base_url,
            api_key,
            request_timeout: time::millis_to_duration(self.primary.request_timeout_ms),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.primary.max_attempts.max(1),
            base_delay: time::millis_to_duration(self.primary.backoff_base_ms),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        time::millis_to_duration(self.primary.probe_timeout_ms)
    }

    pub fn channel_timeout(&self) -> Duration {
        time::millis_to_duration(self.channel_timeout_ms)
    }

    /// Reject settings that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if self.primary.table.trim().is_empty() {
            return Err(Error::Config("[primary] table must not be empty".to_string()));
        }
        if self.primary.probe_timeout_ms == 0 || self.primary.request_timeout_ms == 0 {
            return Err(Error::Config(
                "[primary] timeouts must be greater than zero".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() || channel.url.trim().is_empty() {
                return Err(Error::Config(
                    "Every [[channels]] entry needs a name and a url".to_string(),
                ));
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate channel name '{}'",
                    channel.name
                )));
            }
        }
        Ok(())
    }

    /// Write this configuration as TOML, returning the path written
    ///
    /// Without `output` the user config location is used. An existing file
    /// is only replaced when `force` is set.
    pub fn write_file(&self, output: Option<&Path>, force: bool) -> Result<PathBuf> {
        let path = match output {
            Some(path) => path.to_path_buf(),
            None => config_file_candidates(MODULE_NAME)
                .into_iter()
                .next()
                .ok_or_else(|| Error::Config("No user config directory available".to_string()))?,
        };

        if path.exists() && !force {
            return Err(Error::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }

        write_toml_config(self, &path)?;
        Ok(path)
    }
}
