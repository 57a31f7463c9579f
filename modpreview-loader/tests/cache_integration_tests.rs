//! Integration tests for the memo cache
//!
//! These tests verify:
//! - One computation per key under concurrent lookups
//! - Replacement when a file-backed token changes
//! - Lazy expiry by life
//! - Failures delivered once, then retried
//! - Statistics

use modpreview_loader::cache::{CacheConfig, InvalidationReason, MemoCache};
use modpreview_loader::{ExpiryToken, LayeredFileSource, LoaderError, ResourceSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn file_cache(source: Arc<LayeredFileSource>, calls: Arc<AtomicUsize>) -> MemoCache<String, usize> {
    let token_source = source.clone();
    MemoCache::new(
        CacheConfig::assets(),
        move |path: String| {
            let (source, calls) = (source.clone(), calls.clone());
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                source.read(&path).await.map(|content| content.bytes.len())
            }
        },
        move |path: String, _value| {
            let source = token_source.clone();
            async move { source.token(&path).await }
        },
    )
}

#[tokio::test]
async fn test_concurrent_lookups_compute_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = {
        let calls = calls.clone();
        Arc::new(MemoCache::with_life_only(CacheConfig::assets(), move |key: u32| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(key * 2)
            }
        }))
    };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(21).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_file_token_change_replaces_entry() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("gfx")).unwrap();
    std::fs::write(dir.path().join("gfx/flag.tga"), b"1234").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(LayeredFileSource::new(vec![dir.path().to_path_buf()]));
    let cache = file_cache(source, calls.clone());

    assert_eq!(cache.get("gfx/flag.tga".to_string()).await.unwrap(), 4);
    assert_eq!(cache.get("gfx/flag.tga".to_string()).await.unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    std::fs::write(dir.path().join("gfx/flag.tga"), b"123456789").unwrap();
    assert_eq!(cache.get("gfx/flag.tga".to_string()).await.unwrap(), 9);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = cache.stats().await;
    assert_eq!(stats.replaced_token, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_missing_file_error_is_retried() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(LayeredFileSource::new(vec![dir.path().to_path_buf()]));
    let cache = file_cache(source, calls.clone());

    let err = cache.get("gfx/late.dds".to_string()).await.unwrap_err();
    assert!(matches!(err, LoaderError::Io { .. }));

    std::fs::create_dir_all(dir.path().join("gfx")).unwrap();
    std::fs::write(dir.path().join("gfx/late.dds"), b"DDS ").unwrap();

    assert_eq!(cache.get("gfx/late.dds".to_string()).await.unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_life_expiry_is_lazy() {
    let config = CacheConfig::builder()
        .life(Duration::from_millis(50))
        .ttl_jitter(0.0)
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = {
        let calls = calls.clone();
        MemoCache::with_life_only(config, move |key: String| {
            let calls = calls.clone();
            async move { Ok(format!("{}#{}", key, calls.fetch_add(1, Ordering::SeqCst))) }
        })
    };

    assert_eq!(cache.get("map".to_string()).await.unwrap(), "map#0");
    tokio::time::sleep(Duration::from_millis(80)).await;

    // Still stored until looked up or swept
    assert!(cache.contains_key(&"map".to_string()).await);
    let events = cache.cleanup_expired().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, InvalidationReason::Expired);
    assert!(cache.is_empty().await);

    assert_eq!(cache.get("map".to_string()).await.unwrap(), "map#1");
}

#[tokio::test]
async fn test_token_from_computed_value() {
    // Token fingerprints the value, so the entry survives as long as the
    // value reports the same revision
    let revision = Arc::new(AtomicUsize::new(0));
    let cache = {
        let (factory_rev, token_rev) = (revision.clone(), revision.clone());
        MemoCache::new(
            CacheConfig::assets(),
            move |_key: &'static str| {
                let rev = factory_rev.load(Ordering::SeqCst);
                async move { Ok(rev) }
            },
            move |_key, value| {
                let current = token_rev.load(Ordering::SeqCst);
                async move {
                    let computed = value.await.unwrap_or(usize::MAX);
                    ExpiryToken::new(format!("{}", computed.max(current)))
                }
            },
        )
    };

    assert_eq!(cache.get("sprites").await.unwrap(), 0);
    assert_eq!(cache.get("sprites").await.unwrap(), 0);
    revision.store(3, Ordering::SeqCst);
    assert_eq!(cache.get("sprites").await.unwrap(), 3);

    let stats = cache.stats().await;
    assert_eq!(stats.computations(), 2);
}
