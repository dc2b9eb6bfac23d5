//! Get/set-with-TTL cache used by the query side.

use crate::constants::CACHE_MAX_ENTRIES;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
}

/// Bounded in-process cache.
///
/// When full, expired entries go first, then the entry nearest to expiry.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, String)>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, String)>> {
        // entries stay consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(CACHE_MAX_ENTRIES)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((expires, value)) if *expires > Instant::now() => return Some(value.clone()),
            Some(_) => {}
            None => {
                trace!(key, "cache miss");
                return None;
            }
        }
        entries.remove(key);
        trace!(key, "cache entry expired");
        None
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.lock();

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            entries.retain(|_, (expires, _)| *expires > now);
            if entries.len() >= self.max_entries {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, (expires, _))| *expires)
                    .map(|(k, _)| k.clone());
                if let Some(k) = soonest {
                    entries.remove(&k);
                }
            }
        }

        entries.insert(key.to_string(), (now + ttl, value));
    }
}
