//! Small in-memory TTL cache for remote call results

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

pub const DEFAULT_TTL_SECS: i64 = 300;

#[derive(Clone)]
struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Expired entries are dropped lazily on read, or in bulk via `purge_expired`.
pub struct TtlCache<V: Clone> {
    entries: DashMap<String, Entry<V>>,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl_secs: i64) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl: Duration::seconds(default_ttl_secs),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Utc::now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }

        // the shard guard must be released before removing
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Utc::now() + ttl,
            },
        );
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("[CACHE] Purged {} expired entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stable key for a namespaced piece of text.
pub fn cache_key(namespace: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
