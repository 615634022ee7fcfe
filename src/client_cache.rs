//! Store-handle cache.
//!
//! The server opens one [`SqliteStore`] per configured store name and
//! reuses it across requests. Entries expire after `cache.ttl_secs` and the
//! cache never holds more than `cache.max_entries` handles; when full, the
//! oldest entry is evicted. Expired or closed handles are rebuilt on the
//! next lookup.
//!
//! Time comes from an injected [`Clock`] so expiry is testable without
//! sleeping.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::CacheConfig;
use crate::sqlite_store::SqliteStore;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

struct CachedHandle {
    store: Arc<SqliteStore>,
    opened_at: Instant,
}

/// Keyed cache of open store handles.
pub struct HandleCache {
    entries: AsyncMutex<HashMap<String, CachedHandle>>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl HandleCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: AsyncMutex::new(HashMap::new()),
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries.max(1),
            clock,
        }
    }

    /// Return the handle cached under `key`, opening `path` if the entry is
    /// missing, expired, or closed.
    pub async fn get_or_open(&self, key: &str, path: &Path) -> Result<Arc<SqliteStore>> {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now();

        if let Some(entry) = entries.get(key) {
            let expired = now.saturating_duration_since(entry.opened_at) >= self.ttl;
            if !expired && !entry.store.is_closed() {
                return Ok(entry.store.clone());
            }
            tracing::debug!(store = key, expired, "rebuilding store handle");
            entries.remove(key);
        }

        if entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.opened_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(store = %oldest, "evicting store handle");
                entries.remove(&oldest);
            }
        }

        let store = Arc::new(SqliteStore::open_initialized(path).await?);
        entries.insert(
            key.to_string(),
            CachedHandle {
                store: store.clone(),
                opened_at: now,
            },
        );
        Ok(store)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}
