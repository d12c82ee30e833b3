//! PostgREST store client
//!
//! Thin reqwest wrapper over the hosted data store's REST surface:
//! - `HEAD /rest/v1/` reachability ping
//! - `POST /rest/v1/{table}` insert with `Prefer: return=representation`
//! - `GET /rest/v1/{table}?id=eq.{id}` single-row select
//! - `PATCH /rest/v1/{table}?id=eq.{id}` update
//! - `POST /functions/v1/{name}` serverless function invocation

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("confreg/", env!("CARGO_PKG_VERSION"));
const CLIENT_INFO: &str = "confreg-registration-form";

/// Store transport errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_decode() {
            StoreError::Parse(err.to_string())
        } else {
            StoreError::Network(err.to_string())
        }
    }
}

/// Connection settings for the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub base_url: String,
    /// API key sent as `apikey` and bearer token
    pub api_key: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// PostgREST client
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PostgrestClient {
    pub fn new(settings: &StoreSettings) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("x-client-info", CLIENT_INFO)
            .header("Cache-Control", "no-cache")
    }

    /// `HEAD /rest/v1/`, returning whatever status the server answered with
    ///
    /// Only transport failures are errors; interpreting the status is up to
    /// the caller.
    pub async fn ping(&self, timeout: Duration) -> Result<u16, StoreError> {
        let url = format!("{}/rest/v1/", self.base_url);
        let response = self
            .authorized(self.http_client.head(&url))
            .timeout(timeout)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }

    /// Insert rows and return the stored representation
    pub async fn insert<T, R>(&self, table: &str, rows: &[T]) -> Result<Vec<R>, StoreError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        tracing::debug!(table, rows = rows.len(), "Inserting rows");

        let response = self
            .authorized(self.http_client.post(&url))
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .json::<Vec<R>>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }

    /// Fetch a single row by id; `Ok(None)` when no row matches
    pub async fn select_by_id<R>(&self, table: &str, id: &str) -> Result<Option<R>, StoreError>
    where
        R: DeserializeOwned,
    {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let response = self
            .authorized(self.http_client.get(&url))
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())])
            .send()
            .await?;

        let response = check_status(response).await?;
        let mut rows = response
            .json::<Vec<R>>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Patch a single row by id
    pub async fn update_by_id<T>(&self, table: &str, id: &str, patch: &T) -> Result<(), StoreError>
    where
        T: Serialize,
    {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let response = self
            .authorized(self.http_client.patch(&url))
            .query(&[("id", format!("eq.{}", id))])
            .json(patch)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Invoke a serverless function with a JSON body
    pub async fn invoke_function<T>(
        &self,
        name: &str,
        body: &T,
    ) -> Result<serde_json::Value, StoreError>
    where
        T: Serialize,
    {
        let url = format!("{}/functions/v1/{}", self.base_url, name);
        let response = self
            .authorized(self.http_client.post(&url))
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| StoreError::Parse(e.to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        body,
    })
}
