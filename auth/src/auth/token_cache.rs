use super::types::{CachedToken, TokenCacheKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory "last known good" tokens, keyed by what was requested.
///
/// Entries are immutable `Arc<CachedToken>` records swapped in a single
/// assignment under the write lock.
#[derive(Clone)]
pub struct MemoryTokenCache {
    cache: Arc<RwLock<HashMap<TokenCacheKey, Arc<CachedToken>>>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the entry for `key` if it is still valid right now.
    pub async fn get(&self, key: &TokenCacheKey) -> Option<Arc<CachedToken>> {
        self.get_at(key, Utc::now()).await
    }

    /// Returns the entry for `key` if its expiry lies strictly after `now`.
    pub async fn get_at(&self, key: &TokenCacheKey, now: DateTime<Utc>) -> Option<Arc<CachedToken>> {
        let cache = self.cache.read().await;
        cache
            .get(key)
            .filter(|token| token.is_valid_at(now))
            .cloned()
    }

    pub async fn set(&self, key: TokenCacheKey, token: Arc<CachedToken>) {
        let mut cache = self.cache.write().await;
        cache.insert(key, token);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

impl Default for MemoryTokenCache {
    fn default() -> Self {
        Self::new()
    }
}
