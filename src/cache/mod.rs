//! Response cache
//!
//! In-memory store for responses that opted into shared caching. Entries
//! expire after the lifetime the response declared and the store is bounded
//! both in entry count and per-entry body size.

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Response body of {size} bytes exceeds the {limit} byte limit")]
    EntryTooLarge { size: usize, limit: usize },

    #[error("Response lifetime is zero")]
    Expired,
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// A stored response
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl CachedResponse {
    /// Seconds since the entry was stored, for the `Age` header
    pub fn age(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.stored_at).as_secs()
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Bounded in-memory response store
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CachedResponse>>,
    max_entries: usize,
    max_body_size: usize,
}

impl ResponseCache {
    pub fn new(max_entries: usize, max_body_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            max_body_size,
        }
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Fresh entry for `key`, if any
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .cloned()
    }

    /// Store a response for `ttl`, evicting expired and then oldest entries
    /// to stay within `max_entries`
    pub async fn insert(
        &self,
        key: String,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        ttl: Duration,
    ) -> Result<()> {
        if body.len() > self.max_body_size {
            return Err(CacheError::EntryTooLarge {
                size: body.len(),
                limit: self.max_body_size,
            });
        }
        if ttl.is_zero() {
            return Err(CacheError::Expired);
        }

        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| entry.is_fresh(now));
        }
        while !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(oldest) => {
                    entries.remove(&oldest);
                }
                None => break,
            }
        }

        entries.insert(
            key,
            CachedResponse {
                status,
                headers,
                body,
                stored_at: now,
                expires_at: now + ttl,
            },
        );

        Ok(())
    }

    /// Number of stored entries, fresh or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove all entries, returning how many were dropped
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn put(cache: &ResponseCache, key: &str, body: &'static str, ttl: Duration) -> Result<()> {
        cache
            .insert(
                key.to_string(),
                StatusCode::OK,
                HeaderMap::new(),
                Bytes::from_static(body.as_bytes()),
                ttl,
            )
            .await
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = ResponseCache::new(10, 1024);
        put(&cache, "GET /a", "hello", Duration::from_secs(60)).await.unwrap();

        let entry = cache.get("GET /a").await.unwrap();
        assert_eq!(entry.status, StatusCode::OK);
        assert_eq!(&entry.body[..], b"hello");
        assert!(cache.get("GET /b").await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = ResponseCache::new(10, 1024);
        put(&cache, "GET /a", "hello", Duration::from_millis(50)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("GET /a").await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let cache = ResponseCache::new(10, 4);
        let result = put(&cache, "GET /a", "hello", Duration::from_secs(60)).await;

        assert_eq!(result, Err(CacheError::EntryTooLarge { size: 5, limit: 4 }));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_oldest_entry_evicted_when_full() {
        let cache = ResponseCache::new(2, 1024);
        put(&cache, "GET /a", "a", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        put(&cache, "GET /b", "b", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        put(&cache, "GET /c", "c", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("GET /a").await.is_none());
        assert!(cache.get("GET /b").await.is_some());
        assert!(cache.get("GET /c").await.is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = ResponseCache::new(10, 1024);
        put(&cache, "GET /a", "a", Duration::from_secs(60)).await.unwrap();
        put(&cache, "GET /b", "b", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.clear().await, 2);
        assert!(cache.is_empty().await);
    }
}
