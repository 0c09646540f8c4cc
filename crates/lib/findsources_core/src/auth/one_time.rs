//! Single-use token cache for the external login → session exchange.
//!
//! A one-time token maps to exactly one subject and can be taken once.
//! `take` removes the entry under the map's shard lock before looking at it,
//! so of any number of concurrent callers presenting the same token at most
//! one receives the subject.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// How often the background sweep evicts expired entries.
pub const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug)]
struct Entry {
    subject: String,
    expires_at: DateTime<Utc>,
}

/// In-memory store of one-time tokens keyed by the token string.
#[derive(Debug)]
pub struct OneTimeTokenCache {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl OneTimeTokenCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Store `token → subject`, replacing any previous mapping for `token`.
    pub fn put(&self, token: impl Into<String>, subject: impl Into<String>, ttl: Duration) {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(
            token.into(),
            Entry {
                subject: subject.into(),
                expires_at,
            },
        );
    }

    /// Remove and return the subject for `token`.
    /// Returns `None` if the token is unknown, already taken, or expired.
    pub fn take(&self, token: &str) -> Option<String> {
        let (_, entry) = self.entries.remove(token)?;
        if self.clock.now() >= entry.expires_at {
            debug!("one-time token presented after expiry");
            return None;
        }
        Some(entry.subject)
    }

    /// Evict expired entries, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a task that sweeps the cache every [`SWEEP_INTERVAL`].
    pub fn spawn_sweep_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let evicted = cache.sweep();
                if evicted > 0 {
                    debug!(evicted, "swept expired one-time tokens");
                }
            }
        })
    }
}

impl Default for OneTimeTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate an opaque one-time token (32 random bytes, URL-safe base64).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
