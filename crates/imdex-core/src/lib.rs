//! imdex-core: Offline-first collection flag tracker
//!
//! This library provides the pieces of an optimistic, offline-capable
//! catch tracker:
//! - Local collection store with versioned JSON persistence
//! - Durable pending-op queue with last-write-wins consolidation
//! - Remote collection API client (direct writes and batch upserts)
//! - Session and connectivity monitors
//! - The [`DexTracker`] engine tying the pieces together
//!
//! Hosts embed the tracker behind their own UI; everything here is
//! transport- and platform-agnostic apart from the optional SQLite
//! storage backend.

pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod network;
pub mod queue;
pub mod session;
pub mod storage;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use api::{BatchEntry, BatchUpdate, CollectionApi, EntryUpdate, HttpCollectionApi, RemoteEntry};
pub use clock::{Clock, SystemClock};
pub use config::TrackerConfig;
pub use engine::{DexTracker, SyncOutcome};
pub use error::{ApiError, DexError, Result, StorageError};
pub use model::{CatchFlags, EntryId, EntryKey, FlagField, PendingOp, SyncStatus};
pub use network::{ConnectivityProbe, NetworkMonitor, ScheduledTask};
pub use queue::PendingQueue;
pub use session::{SessionMonitor, SessionProvider};
pub use storage::{KeyValueStorage, MemoryStorage};
pub use store::CollectionStore;

#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
