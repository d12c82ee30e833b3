//! Local Queue Store
//!
//! Holds registrations that exhausted every remote delivery option until a
//! resync delivers them. The store is injected into the pipeline as a
//! [`QueueStore`] trait object.
//!
//! **Durability:** [`FileQueueStore`] survives a process restart but not loss
//! of the root folder. Persistence failures during `enqueue` are logged and
//! the record is dropped; callers are never failed.
//!
//! **Ids:** time-based (epoch milliseconds), bumped past the newest queued id
//! so they are unique and strictly increasing within the queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use confreg_common::config::temp_path_for;
use confreg_common::time;
use confreg_common::RegistrationRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::DeliveryError;

/// File name of the persisted queue inside the root folder
pub const QUEUE_FILE_NAME: &str = "pending_registrations.json";

/// Lifecycle tag of a queued record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
}

/// A registration held locally pending resync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRecord {
    #[serde(flatten)]
    pub record: RegistrationRecord,
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: QueueStatus,
}

/// Durable-enough storage of queued registrations
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a record with a fresh id and `pending` status
    ///
    /// Never fails; persistence problems are logged and the record is lost.
    async fn enqueue(&self, record: RegistrationRecord) -> QueuedRecord;

    /// All queued records, oldest first. No side effects.
    async fn list_pending(&self) -> Vec<QueuedRecord>;

    /// Remove one record after it was delivered
    async fn remove_one(&self, id: i64) -> Result<(), DeliveryError>;

    /// Remove every queued record
    async fn clear_all(&self) -> Result<(), DeliveryError>;
}

fn next_id(existing: &[QueuedRecord], now: &DateTime<Utc>) -> i64 {
    let candidate = time::epoch_millis(now);
    match existing.iter().map(|r| r.id).max() {
        Some(newest) if newest >= candidate => newest + 1,
        _ => candidate,
    }
}

fn new_queued(existing: &[QueuedRecord], record: RegistrationRecord) -> QueuedRecord {
    let now = time::now();
    QueuedRecord {
        id: next_id(existing, &now),
        record,
        timestamp: now,
        status: QueueStatus::Pending,
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// Queue persisted as one JSON array in `pending_registrations.json`
///
/// Every read-modify-write runs under an async mutex, so an overlapping
/// submit and resync cannot interleave. Writes go to a temp file that is
/// renamed over the queue file.
pub struct FileQueueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileQueueStore {
    /// Store rooted in `root_folder` (the folder must already exist)
    pub fn new(root_folder: &Path) -> Self {
        Self::with_path(root_folder.join(QUEUE_FILE_NAME))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<QueuedRecord>, DeliveryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DeliveryError::PersistenceFailure(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            DeliveryError::PersistenceFailure(format!("parse {}: {}", self.path.display(), e))
        })
    }

    async fn write_all(&self, records: &[QueuedRecord]) -> Result<(), DeliveryError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| DeliveryError::PersistenceFailure(e.to_string()))?;

        let tmp_path = temp_path_for(&self.path);
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| DeliveryError::PersistenceFailure(format!("write: {}", e)))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| DeliveryError::PersistenceFailure(format!("rename: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn enqueue(&self, record: RegistrationRecord) -> QueuedRecord {
        let _guard = self.lock.lock().await;

        let mut records = match self.read_all().await {
            Ok(records) => records,
            Err(e) => {
                // Never overwrite a queue we failed to read
                let queued = new_queued(&[], record);
                error!(
                    id = queued.id,
                    email = %queued.record.email,
                    error = %e,
                    "Failed to store registration locally, record dropped"
                );
                return queued;
            }
        };

        let queued = new_queued(&records, record);
        records.push(queued.clone());

        match self.write_all(&records).await {
            Ok(()) => info!(
                id = queued.id,
                email = %queued.record.email,
                pending = records.len(),
                "Registration stored locally"
            ),
            Err(e) => error!(
                id = queued.id,
                email = %queued.record.email,
                error = %e,
                "Failed to store registration locally, record dropped"
            ),
        }

        queued
    }

    async fn list_pending(&self) -> Vec<QueuedRecord> {
        let _guard = self.lock.lock().await;
        match self.read_all().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to read pending registrations");
                Vec::new()
            }
        }
    }

    async fn remove_one(&self, id: i64) -> Result<(), DeliveryError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        let before = records.len();
        records.retain(|r| r.id != id);

        if records.len() == before {
            warn!(id, "Queued registration not found for removal");
            return Ok(());
        }

        self.write_all(&records).await?;
        debug!(id, remaining = records.len(), "Removed queued registration");
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), DeliveryError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Local registrations cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeliveryError::PersistenceFailure(format!(
                "remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local queue, used in tests and `--no-persist` runs
#[derive(Default)]
pub struct MemoryQueueStore {
    records: StdMutex<Vec<QueuedRecord>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Vec<QueuedRecord>> {
        // A panic while holding the lock cannot leave the Vec half-modified
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, record: RegistrationRecord) -> QueuedRecord {
        let mut records = self.records();
        let queued = new_queued(&records, record);
        records.push(queued.clone());
        queued
    }

    async fn list_pending(&self) -> Vec<QueuedRecord> {
        self.records().clone()
    }

    async fn remove_one(&self, id: i64) -> Result<(), DeliveryError> {
        self.records().retain(|r| r.id != id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), DeliveryError> {
        self.records().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confreg_common::Gender;
    use tempfile::TempDir;

    fn record(email: &str) -> RegistrationRecord {
        RegistrationRecord {
            first_name: "Meera".to_string(),
            last_name: "Nair".to_string(),
            phone: Some("+91 9000000000".to_string()),
            email: email.to_string(),
            age: 35,
            gender: Gender::Female,
            state: "India".to_string(),
            purpose: "Speaker".to_string(),
        }
    }

    #[test]
    fn test_next_id_bumps_past_newest() {
        let now = time::now();
        let existing = vec![QueuedRecord {
            record: record("a@b.io"),
            id: time::epoch_millis(&now) + 10,
            timestamp: now,
            status: QueueStatus::Pending,
        }];

        assert_eq!(next_id(&existing, &now), time::epoch_millis(&now) + 11);
        assert_eq!(next_id(&[], &now), time::epoch_millis(&now));
    }

    #[tokio::test]
    async fn test_file_store_enqueue_list_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileQueueStore::new(dir.path());

        let first = store.enqueue(record("one@x.io")).await;
        let second = store.enqueue(record("two@x.io")).await;
        assert!(second.id > first.id);
        assert_eq!(first.status, QueueStatus::Pending);

        let pending = store.list_pending().await;
        assert_eq!(pending, vec![first.clone(), second.clone()]);

        store.remove_one(first.id).await.unwrap();
        assert_eq!(store.list_pending().await, vec![second]);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let queued = FileQueueStore::new(dir.path())
            .enqueue(record("reload@x.io"))
            .await;

        let reopened = FileQueueStore::new(dir.path());
        assert_eq!(reopened.list_pending().await, vec![queued]);
    }

    #[tokio::test]
    async fn test_file_format_uses_flat_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileQueueStore::new(dir.path());
        store.enqueue(record("flat@x.io")).await;

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &json[0];
        assert_eq!(entry["email"], "flat@x.io");
        assert_eq!(entry["status"], "pending");
        assert!(entry["id"].is_i64());
        assert!(entry["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_clear_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileQueueStore::new(dir.path());
        store.enqueue(record("a@x.io")).await;

        store.clear_all().await.unwrap();
        store.clear_all().await.unwrap();
        assert!(store.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_lists_empty_and_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = FileQueueStore::new(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(store.list_pending().await.is_empty());

        // Enqueue must not clobber data it could not parse
        store.enqueue(record("new@x.io")).await;
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn test_enqueue_into_missing_folder_drops_record() {
        let dir = TempDir::new().unwrap();
        let store = FileQueueStore::new(&dir.path().join("does-not-exist"));

        let queued = store.enqueue(record("lost@x.io")).await;
        assert_eq!(queued.status, QueueStatus::Pending);
        assert!(store.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_keep_every_record() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FileQueueStore::new(dir.path()));

        let mut handles = Vec::new();
        for n in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.enqueue(record(&format!("user{}@x.io", n))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let pending = store.list_pending().await;
        assert_eq!(pending.len(), 10);
        let mut ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[tokio::test]
    async fn test_memory_store_matches_contract() {
        let store = MemoryQueueStore::new();
        let a = store.enqueue(record("a@x.io")).await;
        let b = store.enqueue(record("b@x.io")).await;
        assert!(b.id > a.id);

        store.remove_one(a.id).await.unwrap();
        assert_eq!(store.list_pending().await, vec![b]);

        store.clear_all().await.unwrap();
        assert!(store.list_pending().await.is_empty());
    }
}
