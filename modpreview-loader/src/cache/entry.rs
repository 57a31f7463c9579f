//! Cache entries: a shared in-flight computation and the token it was made under

use crate::error::Result;
use crate::token::ExpiryToken;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use std::time::Duration;

/// A computation that any number of callers can await
pub type SharedResult<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Expiry token captured when the entry was created; `None` if capturing failed
pub type SharedToken = Shared<BoxFuture<'static, Option<ExpiryToken>>>;

/// One cache slot. Never updated in place: a stale entry is replaced whole.
pub struct CacheEntry<K, V> {
    /// The cache key
    pub key: K,

    /// The (possibly still running) computation
    pub value: SharedResult<V>,

    /// Token of the key at creation time
    pub token: SharedToken,

    /// Entry metadata
    pub metadata: CacheMetadata,
}

/// Book-keeping for an entry
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub life: Duration,
    pub access_count: u64,

    /// Distinguishes an entry from the one that replaced it
    pub generation: u64,
}

impl<K, V: Clone> CacheEntry<K, V> {
    pub fn new(key: K, value: SharedResult<V>, token: SharedToken, life: Duration, generation: u64) -> Self {
        let now = Utc::now();

        Self {
            key,
            value,
            token,
            metadata: CacheMetadata {
                created_at: now,
                accessed_at: now,
                life,
                access_count: 0,
                generation,
            },
        }
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.metadata.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Check if the entry outlived its life
    pub fn is_expired(&self) -> bool {
        self.age() > self.metadata.life
    }

    /// The computation finished with an error
    pub fn has_failed(&self) -> bool {
        matches!(self.value.peek(), Some(Err(_)))
    }

    /// The computation has not finished yet
    pub fn is_pending(&self) -> bool {
        self.value.peek().is_none()
    }

    /// Mark the entry as accessed (updates access time and count)
    pub fn mark_accessed(&mut self) {
        self.metadata.accessed_at = Utc::now();
        self.metadata.access_count += 1;
    }
}
