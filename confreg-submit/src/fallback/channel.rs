//! Fallback delivery channels
//!
//! A channel is described by a [`ChannelDescriptor`] (loaded from the
//! `[[channels]]` TOML list) and executed by [`HttpChannel`]. Channels whose
//! far end cannot be observed (opaque form posts) carry
//! `response_observable = false` and count as delivered whenever the request
//! itself goes out, whatever status comes back.

use async_trait::async_trait;
use confreg_common::{time, RegistrationRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::DeliveryError;

/// Tag identifying the submitting application in webhook envelopes
pub const SOURCE_TAG: &str = "confreg-registration-form";

/// How the record is encoded on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEncoding {
    /// JSON webhook envelope: record fields + timestamp, source, event_type
    Json {
        #[serde(default)]
        extra: BTreeMap<String, String>,
    },
    /// `application/x-www-form-urlencoded` body
    ///
    /// With an empty `field_map` the record's own field names are posted
    /// (plus `timestamp`); otherwise only mapped fields are posted, under
    /// their mapped names (e.g. `first_name` → `entry.1001`).
    Form {
        #[serde(default)]
        field_map: BTreeMap<String, String>,
        #[serde(default)]
        extra: BTreeMap<String, String>,
    },
    /// Email relay API template payload
    EmailRelay {
        service_id: String,
        template_id: String,
        user_id: String,
        to_email: String,
    },
}

/// One configured fallback channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub url: String,
    pub encoding: ChannelEncoding,
    /// Whether the far end's HTTP status can be read
    #[serde(default = "default_true")]
    pub response_observable: bool,
    /// Require a well-formed JSON body on success
    #[serde(default)]
    pub expect_json: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-channel request timeout override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Anything able to record a submission when the primary store cannot
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Attempt delivery; any failure is a [`DeliveryError::ChannelFailure`]
    async fn deliver(&self, record: &RegistrationRecord) -> Result<(), DeliveryError>;
}

/// Record fields as (name, value) pairs, phone omitted when absent
fn record_fields(record: &RegistrationRecord) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("first_name", record.first_name.clone()),
        ("last_name", record.last_name.clone()),
        ("email", record.email.clone()),
    ];
    if let Some(phone) = &record.phone {
        fields.push(("phone", phone.clone()));
    }
    fields.extend([
        ("age", record.age.to_string()),
        ("gender", record.gender.to_string()),
        ("state", record.state.clone()),
        ("purpose", record.purpose.clone()),
    ]);
    fields
}

/// JSON webhook envelope
pub fn json_envelope(record: &RegistrationRecord, extra: &BTreeMap<String, String>) -> Value {
    let mut body = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    body.insert("timestamp".to_string(), json!(time::now().to_rfc3339()));
    body.insert("source".to_string(), json!(SOURCE_TAG));
    body.insert("event_type".to_string(), json!("registration_submission"));
    for (key, value) in extra {
        body.insert(key.clone(), json!(value));
    }
    Value::Object(body)
}

/// Form body pairs
pub fn form_pairs(
    record: &RegistrationRecord,
    field_map: &BTreeMap<String, String>,
    extra: &BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let mut fields = record_fields(record);
    fields.push(("timestamp", time::now().to_rfc3339()));

    let mut pairs: Vec<(String, String)> = if field_map.is_empty() {
        fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    } else {
        fields
            .into_iter()
            .filter_map(|(name, value)| field_map.get(name).map(|mapped| (mapped.clone(), value)))
            .collect()
    };

    pairs.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    pairs
}

/// Email relay template payload
pub fn email_relay_payload(
    record: &RegistrationRecord,
    service_id: &str,
    template_id: &str,
    user_id: &str,
    to_email: &str,
) -> Value {
    json!({
        "service_id": service_id,
        "template_id": template_id,
        "user_id": user_id,
        "template_params": {
            "to_email": to_email,
            "from_name": record.full_name(),
            "from_email": record.email,
            "phone": record.phone.clone().unwrap_or_default(),
            "age": record.age,
            "gender": record.gender.as_str(),
            "state": record.state,
            "purpose": record.purpose,
            "timestamp": time::now().to_rfc3339(),
        }
    })
}

/// HTTP channel driven by a descriptor
pub struct HttpChannel {
    descriptor: ChannelDescriptor,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpChannel {
    /// `default_timeout` applies unless the descriptor overrides it
    pub fn new(
        descriptor: ChannelDescriptor,
        http_client: reqwest::Client,
        default_timeout: Duration,
    ) -> Self {
        let timeout = descriptor
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(default_timeout);
        Self {
            descriptor,
            http_client,
            timeout,
        }
    }

    pub fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    fn failure(&self, reason: impl Into<String>) -> DeliveryError {
        DeliveryError::ChannelFailure {
            channel: self.descriptor.name.clone(),
            reason: reason.into(),
        }
    }

    fn build_request(&self, record: &RegistrationRecord) -> reqwest::RequestBuilder {
        let mut request = self
            .http_client
            .post(&self.descriptor.url)
            .timeout(self.timeout);

        for (name, value) in &self.descriptor.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        match &self.descriptor.encoding {
            ChannelEncoding::Json { extra } => request.json(&json_envelope(record, extra)),
            ChannelEncoding::Form { field_map, extra } => {
                request.form(&form_pairs(record, field_map, extra))
            }
            ChannelEncoding::EmailRelay {
                service_id,
                template_id,
                user_id,
                to_email,
            } => request.json(&email_relay_payload(
                record,
                service_id,
                template_id,
                user_id,
                to_email,
            )),
        }
    }
}

#[async_trait]
impl DeliveryChannel for HttpChannel {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    async fn deliver(&self, record: &RegistrationRecord) -> Result<(), DeliveryError> {
        let response = self
            .build_request(record)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.failure(format!("no response within {} ms", self.timeout.as_millis()))
                } else {
                    self.failure(e.to_string())
                }
            })?;

        if !self.descriptor.response_observable {
            // Opaque far end: the request went out, nothing more can be known
            return Ok(());
        }

        let status = response.status();
        if !status.is_success() {
            return Err(self.failure(format!("HTTP {}", status.as_u16())));
        }

        if self.descriptor.expect_json {
            response
                .json::<Value>()
                .await
                .map_err(|e| self.failure(format!("malformed response: {}", e)))?;
        }

        Ok(())
    }
}
