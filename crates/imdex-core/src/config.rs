//! Configuration for the imdex tracking engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DexError, Result};

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Remote API root, e.g. "https://dex.example.com/api"
    pub base_url: String,
    /// Bound on the optimistic single-field write, in seconds
    pub direct_write_timeout_secs: u64,
    /// Bound on collection fetches and batch pushes, in seconds
    pub load_timeout_secs: u64,
    /// How long a looked-up credential stays memoized, in seconds
    pub session_ttl_secs: u64,
    /// Bound on a single credential lookup, in milliseconds
    pub session_lookup_timeout_ms: u64,
    /// Connectivity probe cadence, in seconds
    pub probe_period_secs: u64,
    /// Whether toggles require an available identity
    pub require_identity: bool,
    /// Storage key for the persisted collection blob
    pub storage_key: String,
    /// Storage key for the persisted pending-op log
    pub queue_key: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            direct_write_timeout_secs: 5,
            load_timeout_secs: 10,
            session_ttl_secs: 60,
            session_lookup_timeout_ms: 1500,
            probe_period_secs: 30,
            require_identity: true,
            storage_key: "imdex.collection.v1".to_string(),
            queue_key: "imdex.pending.v1".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(DexError::Config("base_url must not be empty".to_string()));
        }
        if self.direct_write_timeout_secs == 0 {
            return Err(DexError::Config(
                "direct_write_timeout_secs must be positive".to_string(),
            ));
        }
        if self.load_timeout_secs == 0 {
            return Err(DexError::Config(
                "load_timeout_secs must be positive".to_string(),
            ));
        }
        if self.session_lookup_timeout_ms == 0 {
            return Err(DexError::Config(
                "session_lookup_timeout_ms must be positive".to_string(),
            ));
        }
        if self.probe_period_secs == 0 {
            return Err(DexError::Config(
                "probe_period_secs must be positive".to_string(),
            ));
        }
        if self.storage_key.is_empty() {
            return Err(DexError::Config(
                "storage_key must not be empty".to_string(),
            ));
        }
        if self.queue_key.is_empty() || self.queue_key == self.storage_key {
            return Err(DexError::Config(
                "queue_key must be non-empty and distinct from storage_key".to_string(),
            ));
        }
        Ok(())
    }

    pub fn direct_write_timeout(&self) -> Duration {
        Duration::from_secs(self.direct_write_timeout_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.session_lookup_timeout_ms)
    }

    pub fn probe_period(&self) -> Duration {
        Duration::from_secs(self.probe_period_secs)
    }
}
