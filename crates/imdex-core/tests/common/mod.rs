//! Shared test doubles for tracker integration tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use imdex_core::api::{BatchUpdate, CollectionApi, EntryUpdate, RemoteEntry};
use imdex_core::clock::Clock;
use imdex_core::error::ApiError;
use imdex_core::model::{CatchFlags, EntryId};
use imdex_core::session::SessionProvider;
use imdex_core::storage::MemoryStorage;
use imdex_core::{DexTracker, SessionMonitor, TrackerConfig};

/// In-memory remote store double.
///
/// Keeps one collection per namespace, records every request, and can be
/// told to refuse or delay calls so tests can exercise the failure and
/// overlap paths.
pub struct FakeApi {
    remote: Mutex<BTreeMap<String, BTreeMap<EntryId, CatchFlags>>>,
    batches: Mutex<Vec<BatchUpdate>>,
    puts: Mutex<Vec<(EntryId, EntryUpdate)>>,
    fetch_calls: AtomicUsize,
    fail_writes: Mutex<bool>,
    failing_namespaces: Mutex<Vec<String>>,
    fetch_delay: Mutex<Option<Duration>>,
    write_delay: Mutex<Option<Duration>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            remote: Mutex::new(BTreeMap::new()),
            batches: Mutex::new(Vec::new()),
            puts: Mutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
            fail_writes: Mutex::new(false),
            failing_namespaces: Mutex::new(Vec::new()),
            fetch_delay: Mutex::new(None),
            write_delay: Mutex::new(None),
        })
    }

    pub fn seed_remote(&self, namespace: &str, entry: EntryId, flags: CatchFlags) {
        self.remote
            .lock()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .insert(entry, flags);
    }

    pub fn remote_flags(&self, namespace: &str, entry: EntryId) -> Option<CatchFlags> {
        self.remote
            .lock()
            .unwrap()
            .get(namespace)
            .and_then(|ns| ns.get(&entry))
            .copied()
    }

    pub fn remote_namespace(&self, namespace: &str) -> BTreeMap<EntryId, CatchFlags> {
        self.remote
            .lock()
            .unwrap()
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    pub fn batches(&self) -> Vec<BatchUpdate> {
        self.batches.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn puts(&self) -> Vec<(EntryId, EntryUpdate)> {
        self.puts.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    /// Refuse batch pushes for one namespace while others keep working.
    #[allow(dead_code)]
    pub fn fail_namespace(&self, namespace: &str) {
        self.failing_namespaces
            .lock()
            .unwrap()
            .push(namespace.to_string());
    }

    #[allow(dead_code)]
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    #[allow(dead_code)]
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    fn writes_refused(&self, namespace: &str) -> bool {
        *self.fail_writes.lock().unwrap()
            || self
                .failing_namespaces
                .lock()
                .unwrap()
                .iter()
                .any(|ns| ns == namespace)
    }

    async fn maybe_sleep(delay: Option<Duration>) {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CollectionApi for FakeApi {
    async fn fetch_collection(
        &self,
        namespace: &str,
    ) -> Result<Vec<RemoteEntry>, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        Self::maybe_sleep(delay).await;

        Ok(self
            .remote_namespace(namespace)
            .into_iter()
            .map(|(entry, flags)| RemoteEntry::new(entry, flags))
            .collect())
    }

    async fn put_entry(
        &self,
        entry: EntryId,
        update: &EntryUpdate,
    ) -> Result<(), ApiError> {
        if self.writes_refused(&update.namespace) {
            return Err(ApiError::Transport {
                message: "write refused".into(),
            });
        }
        self.puts.lock().unwrap().push((entry, update.clone()));

        let mut remote = self.remote.lock().unwrap();
        let ns = remote.entry(update.namespace.clone()).or_default();
        let flags = ns.entry(entry).or_default();
        flags.set(update.field, update.value);
        Ok(())
    }

    async fn push_batch(&self, batch: &BatchUpdate) -> Result<(), ApiError> {
        let delay = *self.write_delay.lock().unwrap();
        Self::maybe_sleep(delay).await;

        if self.writes_refused(&batch.namespace) {
            return Err(ApiError::Transport {
                message: "write refused".into(),
            });
        }
        self.batches.lock().unwrap().push(batch.clone());

        // Batch entries are absolute flag sets, applied as upserts.
        let mut remote = self.remote.lock().unwrap();
        let ns = remote.entry(batch.namespace.clone()).or_default();
        for update in &batch.updates {
            ns.insert(update.entity_id, update.fields);
        }
        Ok(())
    }
}

/// Session double with a swappable token.
pub struct FakeSession {
    token: Mutex<Option<String>>,
}

impl FakeSession {
    pub fn signed_in() -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(Some("integration-token".to_string())),
        })
    }

    #[allow(dead_code)]
    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(None),
        })
    }

    pub fn set_token(&self, token: Option<&str>) {
        *self.token.lock().unwrap() = token.map(str::to_string);
    }
}

#[async_trait]
impl SessionProvider for FakeSession {
    async fn access_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }
}

/// Manually advanced clock so op timestamps are deterministic.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new() -> Arc<Self> {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    #[allow(dead_code)]
    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A tracker wired to fakes, plus handles to the fakes themselves.
pub struct Harness {
    pub tracker: Arc<DexTracker>,
    pub api: Arc<FakeApi>,
    pub session: Arc<FakeSession>,
    pub storage: Arc<MemoryStorage>,
    pub clock: Arc<FixedClock>,
}

/// Build a hydrated tracker on fresh storage, signed in and online.
pub async fn harness() -> Harness {
    harness_on(Arc::new(MemoryStorage::new())).await
}

/// Build a hydrated tracker on existing storage, signed in and online.
pub async fn harness_on(storage: Arc<MemoryStorage>) -> Harness {
    let config = TrackerConfig::default();
    let api = FakeApi::new();
    let session = FakeSession::signed_in();
    let clock = FixedClock::new();

    let monitor = Arc::new(SessionMonitor::new(
        session.clone(),
        config.session_ttl(),
        config.session_lookup_timeout(),
    ));
    let tracker = DexTracker::new(
        config,
        storage.clone(),
        api.clone(),
        monitor,
        clock.clone(),
    )
    .unwrap();
    tracker.hydrate().await.unwrap();

    Harness {
        tracker: Arc::new(tracker),
        api,
        session,
        storage,
        clock,
    }
}
