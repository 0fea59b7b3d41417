//! Session monitoring
//!
//! The engine never talks to the auth layer directly; a
//! [`SessionProvider`] supplies short-lived bearer credentials, and the
//! [`SessionMonitor`] memoizes lookups for a short TTL and races them
//! against a timeout so a stalled platform session layer degrades to
//! "no credential" instead of hanging callers.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

/// Source of bearer credentials.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current access token, or `None` when no identity is signed in.
    async fn access_token(&self) -> Option<String>;
}

struct CachedLookup {
    token: Option<String>,
    fetched_at: Instant,
}

/// TTL-memoized, timeout-bounded credential lookup.
pub struct SessionMonitor {
    provider: Arc<dyn SessionProvider>,
    ttl: Duration,
    lookup_timeout: Duration,
    cached: Mutex<Option<CachedLookup>>,
}

impl SessionMonitor {
    pub fn new(provider: Arc<dyn SessionProvider>, ttl: Duration, lookup_timeout: Duration) -> Self {
        Self {
            provider,
            ttl,
            lookup_timeout,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token.
    ///
    /// A completed lookup (token or signed-out) is memoized for the TTL.
    /// A lookup that exceeds the timeout yields `None` without touching
    /// the memoized value.
    pub async fn token(&self) -> Option<String> {
        if let Some(token) = self.fresh_cached() {
            return token;
        }

        match tokio::time::timeout(self.lookup_timeout, self.provider.access_token()).await {
            Ok(token) => {
                let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
                *cached = Some(CachedLookup {
                    token: token.clone(),
                    fetched_at: Instant::now(),
                });
                token
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "session lookup timed out, proceeding without credential"
                );
                None
            }
        }
    }

    /// Whether any identity is currently available.
    pub async fn has_identity(&self) -> bool {
        self.token().await.is_some()
    }

    /// Drop the memoized lookup, forcing the next call to hit the
    /// provider. Hosts call this on sign-in and sign-out.
    pub fn invalidate(&self) {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        *cached = None;
    }

    fn fresh_cached(&self) -> Option<Option<String>> {
        let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        cached
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.token.clone())
    }
}
