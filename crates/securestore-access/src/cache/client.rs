//! Cache client abstraction

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::AccessResult;

/// Minimal byte-oriented cache with per-entry time-to-live
///
/// `ttl = None` stores the entry without expiry.
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    async fn get(&self, key: &str) -> AccessResult<Option<Vec<u8>>>;

    /// Store only if `key` is absent; returns whether the entry was written
    async fn set_new(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AccessResult<bool>;

    /// Overwrite only if `key` is present; returns whether the entry was written
    async fn replace(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AccessResult<bool>;

    /// Returns whether an entry was removed
    async fn delete(&self, key: &str) -> AccessResult<bool>;
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// In-process cache honouring TTLs, for tests and single-node setups
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|e| e.live())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> AccessResult<Option<Vec<u8>>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .get(key)
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    async fn set_new(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AccessResult<bool> {
        let mut entries = self.entries.write().unwrap();
        if entries.get(key).is_some_and(|e| e.live()) {
            return Ok(false);
        }
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(true)
    }

    async fn replace(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> AccessResult<bool> {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(key) {
            Some(entry) if entry.live() => {
                *entry = CacheEntry::new(value, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> AccessResult<bool> {
        let mut entries = self.entries.write().unwrap();
        Ok(entries.remove(key).is_some_and(|e| e.live()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_new_refuses_live_entry() {
        let cache = InMemoryCache::new();

        assert!(cache.set_new("k", b"a".to_vec(), None).await.unwrap());
        assert!(!cache.set_new("k", b"b".to_vec(), None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn test_replace_requires_entry() {
        let cache = InMemoryCache::new();

        assert!(!cache.replace("k", b"a".to_vec(), None).await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());

        cache.set_new("k", b"a".to_vec(), None).await.unwrap();
        assert!(cache.replace("k", b"b".to_vec(), None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = InMemoryCache::new();
        let ttl = Some(Duration::from_millis(30));

        cache.set_new("k", b"a".to_vec(), ttl).await.unwrap();
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(!cache.delete("k").await.unwrap());
        // Expired slot can be claimed again
        assert!(cache.set_new("k", b"b".to_vec(), None).await.unwrap());
    }
}
