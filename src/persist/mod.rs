//! Local snapshot persistence.
//!
//! Stores write their last confirmed records as a versioned JSON envelope
//! into a [`KeyValueStore`]. Snapshots are a last-known-good cache only;
//! the backend stays the source of truth.

mod memory;
mod sqlite;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{PersistError, PersistResult};
use crate::records::Record;

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// String key-value storage backing the snapshots.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PersistResult<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> PersistResult<()>;
    async fn remove(&self, key: &str) -> PersistResult<()>;
}

/// Persisted state of one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<R> {
    pub version: u32,
    pub owner_id: String,
    pub fetched_at: Option<DateTime<Utc>>,
    pub records: Vec<R>,
}

impl<R: Record> Snapshot<R> {
    pub fn new(
        owner_id: impl Into<String>,
        fetched_at: Option<DateTime<Utc>>,
        records: Vec<R>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            owner_id: owner_id.into(),
            fetched_at,
            records,
        }
    }

    pub fn encode(&self) -> PersistResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored envelope, migrating older versions forward
    pub fn decode(key: &str, raw: &str) -> PersistResult<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|e| PersistError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        let value = migrate(key, value)?;
        serde_json::from_value(value).map_err(|e| PersistError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// Bring a raw envelope up to [`SNAPSHOT_VERSION`].
///
/// Version 1 envelopes use `userId`, `lastFetched` (epoch millis) and
/// `entries`; envelopes without a version are treated as version 1.
pub fn migrate(key: &str, mut value: Value) -> PersistResult<Value> {
    let version = value
        .get("version")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;

    if version > SNAPSHOT_VERSION {
        return Err(PersistError::UnsupportedVersion {
            found: version,
            supported: SNAPSHOT_VERSION,
        });
    }

    if version == 1 {
        let map = value.as_object_mut().ok_or_else(|| PersistError::Corrupt {
            key: key.to_string(),
            message: "snapshot is not an object".to_string(),
        })?;

        let owner = map.remove("userId").unwrap_or(Value::Null);
        let fetched_at = map
            .remove("lastFetched")
            .and_then(|v| v.as_i64())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        let records = map.remove("entries").unwrap_or_else(|| Value::Array(Vec::new()));

        map.insert("version".to_string(), Value::from(SNAPSHOT_VERSION));
        map.insert("owner_id".to_string(), owner);
        map.insert(
            "fetched_at".to_string(),
            serde_json::to_value(fetched_at)?,
        );
        map.insert("records".to_string(), records);

        info!(key, from = 1, to = SNAPSHOT_VERSION, "Migrated snapshot");
    }

    Ok(value)
}

/// Namespaced snapshot access for the stores.
#[derive(Clone)]
pub struct SnapshotPersistence {
    kv: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl SnapshotPersistence {
    pub fn new(kv: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
        }
    }

    pub fn key(&self, collection: &str) -> String {
        format!("{}:{}", self.namespace, collection)
    }

    pub async fn save<R: Record>(&self, snapshot: &Snapshot<R>) -> PersistResult<()> {
        let key = self.key(R::COLLECTION);
        self.kv.put(&key, &snapshot.encode()?).await?;
        debug!(key = %key, records = snapshot.records.len(), "Snapshot saved");
        Ok(())
    }

    pub async fn load<R: Record>(&self) -> PersistResult<Option<Snapshot<R>>> {
        let key = self.key(R::COLLECTION);
        match self.kv.get(&key).await? {
            Some(raw) => Snapshot::decode(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    pub async fn clear(&self, collection: &str) -> PersistResult<()> {
        self.kv.remove(&self.key(collection)).await
    }
}
