//! Primary store access
//!
//! - [`PrimaryStore`]: the remote insert + reachability seam
//! - [`probe::ConnectivityProbe`]: pre-flight reachability check
//! - [`submitter::PrimarySubmitter`]: bounded retry with exponential backoff

pub mod probe;
pub mod submitter;

use async_trait::async_trait;
use confreg_common::registration::{StoreId, StoredRegistration};
use confreg_common::store::{PostgrestClient, StoreError, StoreSettings};
use confreg_common::RegistrationRecord;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

pub use probe::{ConnectivityProbe, ProbeReport};
pub use submitter::{PrimarySubmitter, RetryPolicy, Sleeper, TokioSleeper};

/// The hosted data store the pipeline writes to first
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Lightweight reachability request; returns the HTTP status answered
    async fn ping(&self, timeout: Duration) -> Result<u16, StoreError>;

    /// Insert one registration, returning the stored row(s)
    ///
    /// `Ok` means the store accepted the write. Callers retry on `Err`, so
    /// an accepted insert must never surface as an error.
    async fn insert(&self, record: &RegistrationRecord)
        -> Result<Vec<StoredRegistration>, StoreError>;
}

/// [`PrimaryStore`] backed by the PostgREST registrations table
pub struct RestPrimaryStore {
    client: PostgrestClient,
    table: String,
}

impl RestPrimaryStore {
    pub fn new(settings: &StoreSettings, table: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            client: PostgrestClient::new(settings)?,
            table: table.into(),
        })
    }

    pub fn client(&self) -> &PostgrestClient {
        &self.client
    }
}

#[async_trait]
impl PrimaryStore for RestPrimaryStore {
    async fn ping(&self, timeout: Duration) -> Result<u16, StoreError> {
        self.client.ping(timeout).await
    }

    async fn insert(
        &self,
        record: &RegistrationRecord,
    ) -> Result<Vec<StoredRegistration>, StoreError> {
        // Parse errors can only follow a 2xx answer: the row is written
        let rows: Vec<Value> = match self
            .client
            .insert(&self.table, std::slice::from_ref(record))
            .await
        {
            Ok(rows) => rows,
            Err(StoreError::Parse(e)) => {
                warn!(error = %e, "Insert accepted but echoed rows are unreadable");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(rows
            .into_iter()
            .filter_map(|row| echoed_row(row, record))
            .collect())
    }
}

/// Decode an echoed row, keeping at least its id when other columns drift
fn echoed_row(row: Value, sent: &RegistrationRecord) -> Option<StoredRegistration> {
    let id = row.get("id").cloned();
    match serde_json::from_value::<StoredRegistration>(row) {
        Ok(stored) => Some(stored),
        Err(e) => {
            let id = id.and_then(|id| serde_json::from_value::<StoreId>(id).ok());
            match id {
                Some(id) => {
                    warn!(%id, error = %e, "Echoed row has unexpected shape, keeping its id");
                    Some(StoredRegistration {
                        id,
                        record: sent.clone(),
                        created_at: None,
                        ticket_id: None,
                    })
                }
                None => {
                    warn!(error = %e, "Echoed row has no usable id, dropping it");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confreg_common::Gender;
    use serde_json::json;

    fn sent() -> RegistrationRecord {
        RegistrationRecord {
            first_name: "Lea".to_string(),
            last_name: "Brandt".to_string(),
            phone: None,
            email: "lea@example.com".to_string(),
            age: 35,
            gender: Gender::Female,
            state: "Germany".to_string(),
            purpose: "Investor".to_string(),
        }
    }

    #[test]
    fn test_well_formed_row_is_decoded() {
        let mut row = serde_json::to_value(sent()).unwrap();
        row["id"] = json!(4);
        row["created_at"] = json!("2025-01-01T00:00:00Z");

        let stored = echoed_row(row, &sent()).unwrap();
        assert_eq!(stored.id, StoreId::Int(4));
        assert!(stored.created_at.is_some());
    }

    #[test]
    fn test_drifted_row_keeps_id_and_sent_record() {
        let row = json!({ "id": "a1b2", "created_at": "2025-01-01T00:00:00.123456", "age": "n/a" });

        let stored = echoed_row(row, &sent()).unwrap();
        assert_eq!(stored.id, StoreId::Text("a1b2".to_string()));
        assert_eq!(stored.record, sent());
    }

    #[test]
    fn test_row_without_id_is_dropped() {
        assert!(echoed_row(json!({ "email": "x" }), &sent()).is_none());
    }
}
