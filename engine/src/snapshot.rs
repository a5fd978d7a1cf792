//! Snapshot types for persisting and restoring a store.
//!
//! Snapshots are the bridge between the in-memory [`EntityStore`](crate::EntityStore)
//! and disk. Dirty flags and tombstones are part of every record, so unsynced
//! work survives a restart.

use crate::entity::Record;
use crate::error::Result;
use crate::{Entity, LocalId, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of one collection.
///
/// Uses BTreeMap instead of HashMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Entity")]
pub struct StoreSnapshot<T> {
    /// Snapshot format version
    pub format_version: u32,
    /// Collection the records belong to
    pub collection: String,
    /// Records keyed by local id
    pub records: BTreeMap<LocalId, Record<T>>,
}

impl<T: Entity> StoreSnapshot<T> {
    /// Create a new empty snapshot.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            collection: collection.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn add_record(&mut self, record: Record<T>) {
        self.records.insert(record.local_id(), record);
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Count records that still need a push or a remote delete.
    pub fn pending_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.is_dirty() || r.is_pending_delete())
            .count()
    }

    /// Check the snapshot belongs to `T`'s collection.
    pub fn validate(&self) -> Result<()> {
        if self.collection != T::COLLECTION {
            return Err(StoreError::CollectionMismatch {
                expected: T::COLLECTION.to_string(),
                actual: self.collection.clone(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StoreError::InvalidSnapshot(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::InvalidSnapshot(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| StoreError::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }

    /// Write to `path`, going through a temporary sibling file so a crash
    /// mid-write never leaves a truncated snapshot behind.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, self.to_json_pretty()?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
