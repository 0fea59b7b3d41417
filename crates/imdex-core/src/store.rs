//! Local collection store
//!
//! Namespace-partitioned map of entry → [`CatchFlags`], held in memory and
//! persisted as a single versioned JSON blob through the injected
//! [`KeyValueStorage`] capability. Reads and writes are synchronous;
//! hydration and persistence are the only async operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::model::{CatchFlags, EntryId, EntryKey, FlagField};
use crate::storage::KeyValueStorage;

/// Current persisted schema version.
const SCHEMA_VERSION: u32 = 1;

/// Versioned persisted shape of the collection map.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionBlob {
    version: u32,
    entries: BTreeMap<String, BTreeMap<EntryId, CatchFlags>>,
}

impl CollectionBlob {
    /// Parse a persisted blob, lifting legacy shapes to the current version.
    ///
    /// Version 0 blobs predate the version wrapper and are a bare
    /// namespace → entry → flags map. Versions newer than this build are
    /// refused so a downgrade never clobbers data it cannot represent.
    fn migrate(raw: &str) -> Result<Self, StorageError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        match value.get("version").and_then(|v| v.as_u64()) {
            Some(v) if v as u32 == SCHEMA_VERSION => Ok(serde_json::from_value(value)?),
            Some(v) => Err(StorageError::UnsupportedVersion { version: v as u32 }),
            None => {
                let entries = serde_json::from_value(value)?;
                Ok(CollectionBlob {
                    version: SCHEMA_VERSION,
                    entries,
                })
            }
        }
    }
}

/// In-memory collection state with delegated persistence.
///
/// `get`/`set`/`clear` touch memory only and reflect the latest write
/// immediately. [`CollectionStore::persist`] snapshots the map into the
/// storage backend; [`CollectionStore::hydrate`] loads it back and gates
/// consumers through [`CollectionStore::has_hydrated`] so pre-hydration
/// emptiness is never mistaken for confirmed absence.
pub struct CollectionStore {
    entries: Mutex<HashMap<EntryKey, CatchFlags>>,
    has_hydrated: AtomicBool,
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl CollectionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            has_hydrated: AtomicBool::new(false),
            storage,
            key: key.into(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<EntryKey, CatchFlags>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current flags for an entry, `None` when never written.
    pub fn get(&self, key: &EntryKey) -> Option<CatchFlags> {
        self.entries().get(key).copied()
    }

    /// Flags for an entry, defaulting to all-false when absent.
    pub fn get_or_default(&self, key: &EntryKey) -> CatchFlags {
        self.get(key).unwrap_or_default()
    }

    pub fn set(&self, key: EntryKey, flags: CatchFlags) {
        self.entries().insert(key, flags);
    }

    /// Flip one field under the store lock and return the new value.
    ///
    /// The read-modify-write happens in one critical section, so two
    /// toggles on the same field can never interleave mid-flip.
    pub fn toggle(&self, key: EntryKey, field: FlagField) -> bool {
        let mut entries = self.entries();
        let flags = entries.entry(key).or_default();
        let new_value = !flags.get(field);
        flags.set(field, new_value);
        new_value
    }

    /// Drop every entry across all namespaces.
    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Ordered snapshot of one namespace, used for diffing and stats.
    pub fn snapshot(&self, namespace: &str) -> BTreeMap<EntryId, CatchFlags> {
        self.entries()
            .iter()
            .filter(|(key, _)| key.namespace == namespace)
            .map(|(key, flags)| (key.entry, *flags))
            .collect()
    }

    /// Whether hydration has completed.
    ///
    /// Until this turns true, an empty store means "not loaded yet", not
    /// "confirmed empty".
    pub fn has_hydrated(&self) -> bool {
        self.has_hydrated.load(Ordering::Acquire)
    }

    /// Load persisted state into memory.
    ///
    /// A missing blob hydrates empty. A blob this build cannot represent
    /// (unsupported future version, corrupt JSON) leaves the store
    /// un-hydrated and returns the error; the persisted bytes are not
    /// touched.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        let raw = self.storage.get_item(&self.key).await?;
        if let Some(raw) = raw {
            let blob = CollectionBlob::migrate(&raw)?;
            let mut entries = self.entries();
            entries.clear();
            for (namespace, records) in blob.entries {
                for (entry, flags) in records {
                    entries.insert(EntryKey::new(namespace.clone(), entry), flags);
                }
            }
            debug!(entries = entries.len(), "collection hydrated");
        } else {
            debug!("no persisted collection, hydrating empty");
        }
        self.has_hydrated.store(true, Ordering::Release);
        Ok(())
    }

    /// Write the current map to storage as a versioned blob.
    ///
    /// Skipped before hydration completes, so a slow startup can never
    /// overwrite a blob that has not been read yet.
    pub async fn persist(&self) -> Result<(), StorageError> {
        if !self.has_hydrated() {
            debug!("skipping persist before hydration");
            return Ok(());
        }
        let blob = {
            let entries = self.entries();
            let mut grouped: BTreeMap<String, BTreeMap<EntryId, CatchFlags>> = BTreeMap::new();
            for (key, flags) in entries.iter() {
                grouped
                    .entry(key.namespace.clone())
                    .or_default()
                    .insert(key.entry, *flags);
            }
            CollectionBlob {
                version: SCHEMA_VERSION,
                entries: grouped,
            }
        };
        let raw = serde_json::to_string(&blob)?;
        self.storage.set_item(&self.key, &raw).await?;
        Ok(())
    }

    /// Remove the persisted blob entirely.
    pub async fn remove_persisted(&self) -> Result<(), StorageError> {
        self.storage.remove_item(&self.key).await
    }

    /// Merge a remote snapshot into one namespace under the protective
    /// policy: a remote record overwrites local state only when it has at
    /// least one true flag. All-false remote records and entries missing
    /// remotely leave local state alone, so an unflushed optimistic write
    /// survives a stale snapshot. Returns the number of records applied.
    pub fn merge_remote<I>(&self, namespace: &str, records: I) -> usize
    where
        I: IntoIterator<Item = (EntryId, CatchFlags)>,
    {
        let mut entries = self.entries();
        let mut applied = 0;
        for (entry, flags) in records {
            if flags.any() {
                entries.insert(EntryKey::new(namespace.to_string(), entry), flags);
                applied += 1;
            }
        }
        applied
    }
}
