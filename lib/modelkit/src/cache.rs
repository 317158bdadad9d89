//! Detail cache for single-row lookups.
//!
//! Records of a table are cached in one hash per table (see
//! [`TableDescriptor::detail_cache_key`](crate::TableDescriptor::detail_cache_key)),
//! one field per stringified primary key. Cached values are JSON documents.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::ModelError;

/// Key/hash cache store, e.g. a Redis client.
///
/// Failures are reported as [`ModelError::CacheUnavailable`]; callers treat
/// them as misses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Remove a whole key.
    async fn delete(&self, key: &str) -> Result<(), ModelError>;

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), ModelError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, ModelError>;

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), ModelError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    /// `None` when the TTL is too large to represent; the entry never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process cache store with per-field expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    hashes: Mutex<HashMap<String, HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_hashes<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, HashMap<String, Entry>>) -> R,
    ) -> Result<R, ModelError> {
        let mut hashes = self
            .hashes
            .lock()
            .map_err(|e| ModelError::CacheUnavailable(e.to_string()))?;
        Ok(f(&mut hashes))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn delete(&self, key: &str) -> Result<(), ModelError> {
        self.with_hashes(|hashes| {
            hashes.remove(key);
        })
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), ModelError> {
        self.with_hashes(|hashes| {
            if let Some(hash) = hashes.get_mut(key) {
                hash.remove(field);
            }
        })
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, ModelError> {
        self.with_hashes(|hashes| {
            let hash = hashes.get_mut(key)?;
            match hash.get(field) {
                Some(entry) if entry.is_live(Instant::now()) => Some(entry.value.clone()),
                Some(_) => {
                    hash.remove(field);
                    None
                }
                None => None,
            }
        })
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), ModelError> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl);
        self.with_hashes(|hashes| {
            let hash = hashes.entry(key.to_string()).or_default();
            // Fields that are never read again would otherwise linger.
            hash.retain(|_, entry| entry.is_live(now));
            hash.insert(field.to_string(), Entry { value, expires_at });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_and_delete_fields() {
        let cache = MemoryCache::new();
        cache
            .hash_set("users_detail", "1", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .hash_set("users_detail", "2", "[]".into(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.hash_get("users_detail", "1").await.unwrap().as_deref(),
            Some("{}")
        );

        cache.hash_delete("users_detail", "1").await.unwrap();
        assert_eq!(cache.hash_get("users_detail", "1").await.unwrap(), None);
        assert!(cache.hash_get("users_detail", "2").await.unwrap().is_some());

        cache.delete("users_detail").await.unwrap();
        assert_eq!(cache.hash_get("users_detail", "2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_fields_read_as_misses() {
        let cache = MemoryCache::new();
        cache
            .hash_set("users_detail", "1", "{}".into(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cache.hash_get("users_detail", "1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_ttl_never_expires() {
        let cache = MemoryCache::new();
        cache
            .hash_set("users_detail", "1", "{}".into(), Duration::MAX)
            .await
            .unwrap();
        assert!(cache.hash_get("users_detail", "1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn writes_prune_expired_fields() {
        let cache = MemoryCache::new();
        cache
            .hash_set("users_detail", "1", "{}".into(), Duration::ZERO)
            .await
            .unwrap();
        cache
            .hash_set("users_detail", "2", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();

        let hashes = cache.hashes.lock().unwrap();
        let fields: Vec<&String> = hashes["users_detail"].keys().collect();
        assert_eq!(fields, vec!["2"]);
    }
}
