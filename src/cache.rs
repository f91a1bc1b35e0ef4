//! Feature cache contract and in-process TTL implementation
//!
//! The cache is a lossy accelerator, never a source of truth. Writes are
//! fire-and-forget from the publisher; unavailability must not block the
//! pipeline.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub enum CacheError {
    Backend(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Backend(e) => write!(f, "cache backend error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

/// Set-with-TTL / get contract for the latest-feature cache.
#[async_trait]
pub trait FeatureCache: Send + Sync {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
}

/// In-process TTL map. Expired entries are dropped lazily on access and
/// swept opportunistically on writes.
pub struct InMemoryFeatureCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryFeatureCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryFeatureCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeatureCache for InMemoryFeatureCache {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache map poisoned");
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache map poisoned");

        match entries.get(key) {
            Some((_, expires)) if *expires <= now => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }
}
