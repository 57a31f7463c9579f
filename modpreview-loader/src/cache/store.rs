//! Memoizing async cache with expiry tokens and lazy time-to-live

use crate::cache::{
    config::CacheConfig,
    entry::{CacheEntry, SharedResult, SharedToken},
    invalidation::{InvalidationEvent, InvalidationReason},
    types::CacheStats,
};
use crate::error::{LoaderError, Result};
use crate::token::ExpiryToken;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

type Factory<K, V> = Arc<dyn Fn(K) -> BoxFuture<'static, Result<V>> + Send + Sync>;
type TokenFn<K, V> = Arc<dyn Fn(K, SharedResult<V>) -> BoxFuture<'static, ExpiryToken> + Send + Sync>;

/// Key -> value cache for expensive asynchronous computations.
///
/// This implementation provides:
/// - At most one concurrent computation per key: the future is stored before
///   it resolves and handed to every caller arriving in the meantime
/// - Staleness by expiry token: the token function is re-run on every lookup
///   and compared with the token captured when the entry was created
/// - Lazy time-to-live: an entry older than its life is replaced on access
/// - Failures are delivered to the callers awaiting them, then retried
pub struct MemoCache<K, V> {
    config: CacheConfig,
    factory: Factory<K, V>,
    expire_when_change: TokenFn<K, V>,
    store: Arc<RwLock<CacheStore<K, V>>>,
}

/// Internal cache storage
struct CacheStore<K, V> {
    entries: HashMap<K, CacheEntry<K, V>>,
    stats: CacheStats,
    next_generation: u64,
}

/// What a lookup found before deciding to compute
enum Probe {
    Missing,
    Stale { generation: u64, reason: InvalidationReason },
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache.
    ///
    /// `expire_when_change` receives the key and the entry's computation, so
    /// a token may fingerprint a property of the computed value; awaiting the
    /// computation from inside the token function is allowed.
    pub fn new<F, Fut, T, TFut>(config: CacheConfig, factory: F, expire_when_change: T) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
        T: Fn(K, SharedResult<V>) -> TFut + Send + Sync + 'static,
        TFut: Future<Output = ExpiryToken> + Send + 'static,
    {
        info!("Initializing memo cache with config: {:?}", config);

        let store = CacheStore {
            entries: HashMap::new(),
            stats: CacheStats::default(),
            next_generation: 0,
        };

        Self {
            config,
            factory: Arc::new(move |key| factory(key).boxed()),
            expire_when_change: Arc::new(move |key, value| expire_when_change(key, value).boxed()),
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Create a cache whose entries only expire by life
    pub fn with_life_only<F, Fut>(config: CacheConfig, factory: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self::new(config, factory, |_, _| async { ExpiryToken::new("static") })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the value for `key`, computing it if absent or stale
    pub async fn get(&self, key: K) -> Result<V> {
        let existing = {
            let store = self.store.read().await;
            store.entries.get(&key).map(|entry| {
                (
                    entry.metadata.generation,
                    entry.value.clone(),
                    entry.token.clone(),
                    entry.has_failed(),
                    entry.is_expired(),
                )
            })
        };

        let probe = match existing {
            None => Probe::Missing,
            Some((generation, value, token, failed, expired)) => {
                let reason = if failed {
                    Some(InvalidationReason::Failed)
                } else if expired {
                    Some(InvalidationReason::Expired)
                } else {
                    let stored = token.await;
                    let current = (self.expire_when_change)(key.clone(), value.clone()).await;
                    if stored.as_ref() == Some(&current) {
                        None
                    } else {
                        Some(InvalidationReason::TokenChanged)
                    }
                };

                match reason {
                    None => {
                        self.record_hit(&key, generation).await;
                        debug!("Cache hit: {:?}", key);
                        return value.await;
                    }
                    Some(reason) => Probe::Stale { generation, reason },
                }
            }
        };

        let value = self.start_or_join(key, probe).await;
        value.await
    }

    /// Check if a key has an entry (fresh or not)
    pub async fn contains_key(&self, key: &K) -> bool {
        self.store.read().await.entries.contains_key(key)
    }

    /// Remove a specific entry; callers already awaiting it are unaffected
    pub async fn remove(&self, key: &K) -> bool {
        let mut store = self.store.write().await;

        if store.entries.remove(key).is_some() {
            store.stats.invalidations += 1;
            store.stats.entries = store.entries.len();
            debug!("Removed cache entry: {:?}", key);
            true
        } else {
            false
        }
    }

    /// Clear all entries from the cache
    pub async fn clear(&self) {
        let mut store = self.store.write().await;

        let count = store.entries.len();
        store.entries.clear();
        store.stats.entries = 0;
        store.stats.invalidations += count as u64;

        info!("Cleared {} entries from cache", count);
    }

    /// Remove every entry that outlived its life or failed.
    ///
    /// Lookups already do this lazily; a sweep only releases memory sooner.
    pub async fn cleanup_expired(&self) -> Vec<InvalidationEvent> {
        let mut store = self.store.write().await;
        let mut events = Vec::new();

        for reason in [InvalidationReason::Expired, InvalidationReason::Failed] {
            let keys: Vec<K> = store
                .entries
                .iter()
                .filter(|(_, entry)| match reason {
                    InvalidationReason::Expired => entry.is_expired(),
                    _ => entry.has_failed(),
                })
                .map(|(key, _)| key.clone())
                .collect();

            if keys.is_empty() {
                continue;
            }

            for key in &keys {
                store.entries.remove(key);
            }

            let event = InvalidationEvent::new(reason, keys.iter().map(|k| format!("{:?}", k)).collect())
                .with_context(format!("Cleaned up {} entries", keys.len()));
            events.push(event);
        }

        store.stats.entries = store.entries.len();
        if !events.is_empty() {
            debug!("Cache sweep produced {} events", events.len());
        }

        events
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats.clone()
    }

    /// Get number of entries in cache
    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    /// Check if cache is empty
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }

    async fn record_hit(&self, key: &K, generation: u64) {
        if !self.config.enable_metrics {
            return;
        }

        let mut store = self.store.write().await;
        store.stats.hits += 1;
        if let Some(entry) = store.entries.get_mut(key) {
            if entry.metadata.generation == generation {
                entry.mark_accessed();
            }
        }
    }

    /// Start a computation for `key`, unless another caller already replaced
    /// the entry this caller probed, in which case join theirs.
    async fn start_or_join(&self, key: K, probe: Probe) -> SharedResult<V> {
        let mut store = self.store.write().await;

        if let Some(entry) = store.entries.get(&key) {
            let superseded = match probe {
                Probe::Missing => true,
                Probe::Stale { generation, .. } => entry.metadata.generation != generation,
            };
            if superseded {
                debug!("Joining in-flight computation: {:?}", key);
                return entry.value.clone();
            }
        }

        match probe {
            Probe::Missing => {
                debug!("Cache miss: {:?}", key);
                store.stats.misses += 1;
            }
            Probe::Stale { reason, .. } => {
                debug!("Replacing cache entry ({}): {:?}", reason, key);
                match reason {
                    InvalidationReason::Expired => store.stats.replaced_expired += 1,
                    InvalidationReason::TokenChanged => store.stats.replaced_token += 1,
                    InvalidationReason::Failed => store.stats.retried_failures += 1,
                    InvalidationReason::Manual => store.stats.invalidations += 1,
                }
            }
        }

        store.next_generation += 1;
        let entry = self.spawn_entry(key.clone(), store.next_generation);
        let value = entry.value.clone();
        store.entries.insert(key, entry);
        store.stats.entries = store.entries.len();

        value
    }

    /// Launch the factory and the token capture eagerly, so both run even
    /// if the caller that started them stops awaiting.
    fn spawn_entry(&self, key: K, generation: u64) -> CacheEntry<K, V> {
        let computation = tokio::spawn((self.factory)(key.clone()));
        let value: SharedResult<V> = async move {
            match computation.await {
                Ok(result) => result,
                Err(e) => Err(LoaderError::Other(format!("cache computation aborted: {}", e))),
            }
        }
        .boxed()
        .shared();

        let capture = tokio::spawn((self.expire_when_change)(key.clone(), value.clone()));
        let token: SharedToken = async move {
            match capture.await {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!("Expiry token capture aborted: {}", e);
                    None
                }
            }
        }
        .boxed()
        .shared();

        CacheEntry::new(key, value, token, self.config.life_with_jitter(), generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_cache(
        config: CacheConfig,
        calls: Arc<AtomicUsize>,
        version: Arc<AtomicU64>,
    ) -> MemoCache<String, String> {
        MemoCache::new(
            config,
            move |key: String| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(format!("value of {}", key))
                }
            },
            move |_key, _value| {
                let version = version.load(Ordering::SeqCst);
                async move { ExpiryToken::new(format!("v{}", version)) }
            },
        )
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_computation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(CacheConfig::default(), calls.clone(), Arc::new(AtomicU64::new(0)));

        let (a, b) = tokio::join!(cache.get("a".to_string()), cache.get("a".to_string()));
        assert_eq!(a.unwrap(), "value of a");
        assert_eq!(b.unwrap(), "value of a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_change_recomputes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let version = Arc::new(AtomicU64::new(1));
        let cache = counting_cache(CacheConfig::default(), calls.clone(), version.clone());

        cache.get("k".to_string()).await.unwrap();
        cache.get("k".to_string()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        version.store(2, Ordering::SeqCst);
        cache.get("k".to_string()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.replaced_token, 1);
    }

    #[tokio::test]
    async fn test_life_expiration_recomputes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = CacheConfig::builder().life(Duration::from_millis(50)).build();
        let cache = counting_cache(config, calls.clone(), Arc::new(AtomicU64::new(0)));

        cache.get("k".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.get("k".to_string()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().await.replaced_expired, 1);
    }

    #[tokio::test]
    async fn test_failures_are_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let cache: MemoCache<String, u32> = MemoCache::with_life_only(CacheConfig::default(), move |key: String| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(LoaderError::io(key, "locked"))
                } else {
                    Ok(7)
                }
            }
        });

        assert!(cache.get("k".to_string()).await.unwrap_err().is_io());
        assert_eq!(cache.get("k".to_string()).await.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().await.retried_failures, 1);
    }

    #[tokio::test]
    async fn test_token_derived_from_value() {
        let source = Arc::new(parking_lot::Mutex::new("a.dds".to_string()));
        let texture_version = Arc::new(AtomicU64::new(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let factory_source = source.clone();
        let factory_calls = calls.clone();
        let tokens = texture_version.clone();
        let cache: MemoCache<String, String> = MemoCache::new(
            CacheConfig::default(),
            move |_key: String| {
                factory_calls.fetch_add(1, Ordering::SeqCst);
                let texture = factory_source.lock().clone();
                async move { Ok(texture) }
            },
            move |_key, value: SharedResult<String>| {
                let tokens = tokens.clone();
                async move {
                    match value.await {
                        Ok(texture) => ExpiryToken::new(format!(
                            "{}@{}",
                            texture,
                            tokens.load(Ordering::SeqCst)
                        )),
                        Err(_) => ExpiryToken::missing(),
                    }
                }
            },
        );

        assert_eq!(cache.get("sprite".to_string()).await.unwrap(), "a.dds");
        assert_eq!(cache.get("sprite".to_string()).await.unwrap(), "a.dds");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        texture_version.store(2, Ordering::SeqCst);
        *source.lock() = "b.dds".to_string();
        assert_eq!(cache.get("sprite".to_string()).await.unwrap(), "b.dds");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remove_clear_and_cleanup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = CacheConfig::builder().life(Duration::from_millis(30)).build();
        let cache = counting_cache(config, calls, Arc::new(AtomicU64::new(0)));

        cache.get("a".to_string()).await.unwrap();
        cache.get("b".to_string()).await.unwrap();
        assert_eq!(cache.len().await, 2);

        assert!(cache.remove(&"a".to_string()).await);
        assert!(!cache.remove(&"a".to_string()).await);
        assert!(!cache.contains_key(&"a".to_string()).await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let events = cache.cleanup_expired().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, InvalidationReason::Expired);
        assert!(cache.is_empty().await);

        cache.get("c".to_string()).await.unwrap();
        cache.clear().await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().await.invalidations, 2);
    }
}
