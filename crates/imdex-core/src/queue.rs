//! Pending operation queue
//!
//! Append-only log of flag mutations that have not reached the remote
//! store yet. Ops carry absolute field values, so consolidating and
//! re-sending them is idempotent; delivery is at-least-once.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::model::{CatchFlags, EntryKey, PendingOp};
use crate::storage::KeyValueStorage;

/// Current persisted schema version.
const SCHEMA_VERSION: u32 = 1;

/// Versioned persisted shape of the op log.
#[derive(Debug, Serialize, Deserialize)]
struct QueueBlob {
    version: u32,
    ops: Vec<PendingOp>,
}

impl QueueBlob {
    /// Parse a persisted blob, lifting legacy shapes to the current
    /// version. Version 0 blobs are a bare op array.
    fn migrate(raw: &str) -> Result<Self, StorageError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if value.is_array() {
            let ops = serde_json::from_value(value)?;
            return Ok(QueueBlob {
                version: SCHEMA_VERSION,
                ops,
            });
        }
        match value.get("version").and_then(|v| v.as_u64()) {
            Some(v) if v as u32 == SCHEMA_VERSION => Ok(serde_json::from_value(value)?),
            Some(v) => Err(StorageError::UnsupportedVersion { version: v as u32 }),
            None => Err(StorageError::backend("pending blob has no version field")),
        }
    }
}

/// Durable ordered log of unsynced flag mutations.
pub struct PendingQueue {
    ops: Mutex<Vec<PendingOp>>,
    hydrated: AtomicBool,
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl PendingQueue {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            hydrated: AtomicBool::new(false),
            storage,
            key: key.into(),
        }
    }

    fn ops(&self) -> MutexGuard<'_, Vec<PendingOp>> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an op. Ops are never edited in place.
    pub fn push(&self, op: PendingOp) {
        self.ops().push(op);
    }

    pub fn len(&self) -> usize {
        self.ops().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops().is_empty()
    }

    pub fn snapshot(&self) -> Vec<PendingOp> {
        self.ops().clone()
    }

    /// Drop every queued op.
    pub fn clear(&self) {
        self.ops().clear();
    }

    /// Fold the log into one absolute [`CatchFlags`] per entry.
    ///
    /// Ops are applied in ascending timestamp order (ties keep insertion
    /// order); each op overwrites only the field it names, and fields no
    /// op mentions stay false. The result is safe to send repeatedly.
    pub fn consolidate(&self) -> BTreeMap<EntryKey, CatchFlags> {
        let ops = self.ops();
        let mut ordered: Vec<&PendingOp> = ops.iter().collect();
        ordered.sort_by_key(|op| op.timestamp);

        let mut merged: BTreeMap<EntryKey, CatchFlags> = BTreeMap::new();
        for op in ordered {
            merged.entry(op.key()).or_default().set(op.field, op.value);
        }
        merged
    }

    /// Number of queued ops per namespace, in queue order.
    ///
    /// Recorded at flush start so a later [`PendingQueue::drain_prefix`]
    /// removes exactly the ops that flush covered.
    pub fn namespace_counts(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for op in self.ops().iter() {
            *counts.entry(op.namespace.clone()).or_default() += 1;
        }
        counts
    }

    /// Remove the oldest `count` ops that belong to `namespace`.
    ///
    /// Ops enqueued after the count was recorded sit past the prefix and
    /// survive a successful flush they were not part of.
    pub fn drain_prefix(&self, namespace: &str, count: usize) {
        if count == 0 {
            return;
        }
        let mut remaining = count;
        self.ops().retain(|op| {
            if remaining > 0 && op.namespace == namespace {
                remaining -= 1;
                false
            } else {
                true
            }
        });
    }

    pub fn has_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::Acquire)
    }

    /// Load the persisted op log.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        let raw = self.storage.get_item(&self.key).await?;
        if let Some(raw) = raw {
            let blob = QueueBlob::migrate(&raw)?;
            let mut ops = self.ops();
            *ops = blob.ops;
            debug!(ops = ops.len(), "pending queue hydrated");
        }
        self.hydrated.store(true, Ordering::Release);
        Ok(())
    }

    /// Write the current op log to storage as a versioned blob.
    ///
    /// Skipped before hydration completes so an unread blob is never
    /// overwritten.
    pub async fn persist(&self) -> Result<(), StorageError> {
        if !self.has_hydrated() {
            debug!("skipping queue persist before hydration");
            return Ok(());
        }
        let blob = QueueBlob {
            version: SCHEMA_VERSION,
            ops: self.snapshot(),
        };
        let raw = serde_json::to_string(&blob)?;
        self.storage.set_item(&self.key, &raw).await?;
        Ok(())
    }

    /// Remove the persisted blob entirely.
    pub async fn remove_persisted(&self) -> Result<(), StorageError> {
        self.storage.remove_item(&self.key).await
    }
}
