//! Tracker engine.
//!
//! [`DexTracker`] ties the components together: the in-memory
//! [`CollectionStore`], the durable [`PendingQueue`], the remote
//! [`CollectionApi`], and the session and connectivity monitors. Flag
//! mutations land in the local store first and reach the remote store
//! either as a direct write or through the queue; `sync_with_remote`
//! reconciles the two sides on demand.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::{BatchEntry, BatchUpdate, CollectionApi, EntryUpdate, HttpCollectionApi};
use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::{DexError, Result};
use crate::model::{CatchFlags, EntryId, EntryKey, FlagField, PendingOp, SyncStatus};
use crate::network::{ConnectivityProbe, NetworkMonitor, ScheduledTask};
use crate::queue::PendingQueue;
use crate::session::{SessionMonitor, SessionProvider};
use crate::storage::KeyValueStorage;
use crate::store::CollectionStore;

/// Result of a [`DexTracker::sync_with_remote`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Flush, fetch, and diff push all ran.
    Completed,
    /// Another sync holds the guard; nothing was attempted.
    AlreadyRunning,
    /// The network monitor reports offline; nothing was attempted.
    Offline,
    /// No credential was available; nothing was attempted.
    NoSession,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::AlreadyRunning => write!(f, "AlreadyRunning"),
            Self::Offline => write!(f, "Offline"),
            Self::NoSession => write!(f, "NoSession"),
        }
    }
}

/// Clears the syncing flag when a sync scope exits, on success or error.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Offline-first collection tracker.
///
/// All flag state lives in the local store and is readable immediately
/// after a mutation; the remote store catches up through direct writes,
/// queued batches, or a full sync.
pub struct DexTracker {
    config: TrackerConfig,
    store: Arc<CollectionStore>,
    queue: Arc<PendingQueue>,
    api: Arc<dyn CollectionApi>,
    session: Arc<SessionMonitor>,
    network: Arc<NetworkMonitor>,
    clock: Arc<dyn Clock>,
    syncing: AtomicBool,
    last_sync_time: Mutex<Option<DateTime<Utc>>>,
}

impl DexTracker {
    /// Build a tracker from explicit dependencies.
    ///
    /// The config is validated up front; the store and queue are created
    /// on the given storage under the config's two keys.
    pub fn new(
        config: TrackerConfig,
        storage: Arc<dyn KeyValueStorage>,
        api: Arc<dyn CollectionApi>,
        session: Arc<SessionMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(CollectionStore::new(
            storage.clone(),
            config.storage_key.clone(),
        ));
        let queue = Arc::new(PendingQueue::new(storage, config.queue_key.clone()));
        Ok(Self {
            config,
            store,
            queue,
            api,
            session,
            network: Arc::new(NetworkMonitor::default()),
            clock,
            syncing: AtomicBool::new(false),
            last_sync_time: Mutex::new(None),
        })
    }

    /// Production wiring: HTTP api and system clock, with a session
    /// monitor built around the given provider.
    pub fn with_http_api(
        config: TrackerConfig,
        storage: Arc<dyn KeyValueStorage>,
        provider: Arc<dyn SessionProvider>,
    ) -> Result<Self> {
        let session = Arc::new(SessionMonitor::new(
            provider,
            config.session_ttl(),
            config.session_lookup_timeout(),
        ));
        let api = Arc::new(HttpCollectionApi::new(&config, session.clone()));
        Self::new(config, storage, api, session, Arc::new(SystemClock))
    }

    pub fn store(&self) -> &Arc<CollectionStore> {
        &self.store
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn session(&self) -> &Arc<SessionMonitor> {
        &self.session
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_lock()
    }

    /// Load both persisted blobs into memory.
    ///
    /// Persistence stays disabled until hydration has run, so a blob that
    /// was never read cannot be overwritten.
    pub async fn hydrate(&self) -> Result<()> {
        self.store.hydrate().await?;
        self.queue.hydrate().await?;
        info!(
            entries = self.store.len(),
            pending = self.queue.len(),
            "tracker hydrated"
        );
        Ok(())
    }

    pub fn has_hydrated(&self) -> bool {
        self.store.has_hydrated() && self.queue.has_hydrated()
    }

    /// Flip one catch flag, optimistically.
    ///
    /// The local store is updated and readable before any network traffic
    /// starts. Online, the new value goes out as a direct write; if that
    /// fails, or the tracker is offline, the op lands in the pending
    /// queue instead. Network trouble never surfaces to the caller; only
    /// a missing credential does, and only when the config demands one.
    pub async fn toggle_flag(
        &self,
        namespace: &str,
        entry: EntryId,
        field: FlagField,
    ) -> Result<bool> {
        if self.config.require_identity && !self.session.has_identity().await {
            return Err(DexError::IdentityRequired);
        }

        let value = self.store.toggle(EntryKey::new(namespace, entry), field);
        // Stamped before the first await so queue order matches store order.
        let timestamp = self.clock.now();
        debug!(namespace, entry, field = %field, value, "flag toggled");
        self.persist_store().await;

        if self.network.is_online() {
            let update = EntryUpdate {
                namespace: namespace.to_string(),
                field,
                value,
            };
            match self.api.put_entry(entry, &update).await {
                Ok(()) => self.mark_synced(),
                Err(err) => {
                    warn!(
                        namespace,
                        entry,
                        field = %field,
                        error = %err,
                        "direct write failed, queueing op"
                    );
                    self.enqueue(namespace, entry, field, value, timestamp).await;
                }
            }
        } else {
            self.enqueue(namespace, entry, field, value, timestamp).await;
        }

        Ok(value)
    }

    /// String-boundary variant of [`Self::toggle_flag`]: unknown field
    /// names are rejected before they can touch any state.
    pub async fn toggle_field(&self, namespace: &str, entry: EntryId, field: &str) -> Result<bool> {
        self.toggle_flag(namespace, entry, field.parse()?).await
    }

    /// Push everything in the pending queue, one consolidated batch per
    /// namespace. Namespaces fail independently and failed ops stay
    /// queued. Returns true when the queue was fully flushed; a full
    /// flush stamps the sync time.
    pub async fn flush_pending(&self) -> bool {
        if self.queue.is_empty() {
            return true;
        }

        // Counts come first: an op pushed while a batch is in flight is
        // never drained by this pass.
        let counts = self.queue.namespace_counts();
        let consolidated = self.queue.consolidate();

        let mut by_namespace: BTreeMap<String, Vec<BatchEntry>> = BTreeMap::new();
        for (key, fields) in consolidated {
            by_namespace
                .entry(key.namespace)
                .or_default()
                .push(BatchEntry {
                    entity_id: key.entry,
                    fields,
                });
        }

        let mut flushed_all = true;
        for (namespace, updates) in by_namespace {
            let batch = BatchUpdate {
                namespace: namespace.clone(),
                updates,
            };
            match self.api.push_batch(&batch).await {
                Ok(()) => {
                    let count = counts.get(&namespace).copied().unwrap_or(0);
                    self.queue.drain_prefix(&namespace, count);
                    info!(namespace = %namespace, ops = count, "pending ops flushed");
                }
                Err(err) => {
                    warn!(namespace = %namespace, error = %err, "batch push failed, ops kept");
                    flushed_all = false;
                }
            }
        }
        self.persist_queue().await;
        if flushed_all {
            self.mark_synced();
        }
        flushed_all
    }

    /// Fetch one namespace from the remote store and merge it into the
    /// local store under the protective policy: a remote record with no
    /// true flag never overwrites local data. Returns how many records
    /// were applied.
    pub async fn load_namespace(&self, namespace: &str) -> Result<usize> {
        let fetched = match self.api.fetch_collection(namespace).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(namespace, error = %err, "collection fetch failed");
                return Err(err.into());
            }
        };
        let applied = self
            .store
            .merge_remote(namespace, fetched.iter().map(|e| (e.entity_id, e.flags())));
        self.persist_store().await;
        info!(namespace, fetched = fetched.len(), applied, "namespace loaded");
        Ok(applied)
    }

    /// Full reconciliation for one namespace: flush the pending queue,
    /// fetch the remote snapshot, push every local difference as one
    /// batch, and record the sync time.
    ///
    /// At most one sync runs at a time; a call that loses the race
    /// returns [`SyncOutcome::AlreadyRunning`]. Offline or signed-out
    /// calls are no-ops with the matching outcome.
    pub async fn sync_with_remote(&self, namespace: &str) -> Result<SyncOutcome> {
        if !self.network.is_online() {
            debug!(namespace, "sync skipped, offline");
            return Ok(SyncOutcome::Offline);
        }
        if !self.session.has_identity().await {
            debug!(namespace, "sync skipped, no credential");
            return Ok(SyncOutcome::NoSession);
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(namespace, "sync already in progress");
            return Ok(SyncOutcome::AlreadyRunning);
        }
        let _guard = SyncGuard { flag: &self.syncing };

        self.flush_pending().await;

        let fetched = match self.api.fetch_collection(namespace).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(namespace, error = %err, "sync fetch failed");
                return Err(err.into());
            }
        };
        let remote: BTreeMap<EntryId, CatchFlags> =
            fetched.iter().map(|e| (e.entity_id, e.flags())).collect();

        let local = self.store.snapshot(namespace);
        let mut updates = Vec::new();
        for (entry, flags) in &local {
            let differs = match remote.get(entry) {
                Some(remote_flags) => remote_flags != flags,
                // Nothing stored remotely: only worth pushing if some
                // flag is set.
                None => flags.any(),
            };
            if differs {
                updates.push(BatchEntry {
                    entity_id: *entry,
                    fields: *flags,
                });
            }
        }

        if !updates.is_empty() {
            let pushed = updates.len();
            let batch = BatchUpdate {
                namespace: namespace.to_string(),
                updates,
            };
            if let Err(err) = self.api.push_batch(&batch).await {
                warn!(namespace, error = %err, "sync push failed");
                return Err(err.into());
            }
            info!(namespace, pushed, "sync pushed local differences");
        }

        self.mark_synced();
        Ok(SyncOutcome::Completed)
    }

    /// Current tracker status for UI surfaces.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_online: self.network.is_online(),
            is_syncing: self.syncing.load(Ordering::Acquire),
            last_sync_time: *self.last_sync_lock(),
            pending_ops: self.queue.len(),
        }
    }

    /// Wipe the local store, the pending queue, and both persisted blobs.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear();
        self.queue.clear();
        self.store.remove_persisted().await?;
        self.queue.remove_persisted().await?;
        info!("local collection data cleared");
        Ok(())
    }

    /// Start a periodic connectivity probe feeding the network monitor.
    /// The probe stops when the returned task is cancelled or dropped.
    pub fn start_connectivity_probe(&self, probe: Arc<dyn ConnectivityProbe>) -> ScheduledTask {
        self.network.start_probe(probe, self.config.probe_period())
    }

    fn last_sync_lock(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.last_sync_time.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_synced(&self) {
        *self.last_sync_lock() = Some(self.clock.now());
    }

    async fn enqueue(
        &self,
        namespace: &str,
        entry: EntryId,
        field: FlagField,
        value: bool,
        timestamp: DateTime<Utc>,
    ) {
        self.queue.push(PendingOp {
            namespace: namespace.to_string(),
            entry,
            field,
            value,
            timestamp,
        });
        self.persist_queue().await;
    }

    async fn persist_store(&self) {
        if let Err(err) = self.store.persist().await {
            warn!(error = %err, "collection persist failed");
        }
    }

    async fn persist_queue(&self) {
        if let Err(err) = self.queue.persist().await {
            warn!(error = %err, "queue persist failed");
        }
    }
}
