//! # Memoizing Async Cache
//!
//! Generic key -> value store for expensive asynchronous computations, used
//! for derived assets (images, sprite lookups, gfx indexes) that are shared
//! by many previews.
//!
//! ## Features
//!
//! - **Shared in-flight futures**: concurrent requests for one key trigger
//!   the factory once
//! - **Expiry tokens**: an entry is replaced when the token of its key
//!   changes; tokens may depend on the computed value itself
//! - **Lazy time-to-live**: age is checked on access only, no background task
//! - **No cached failures**: a failed computation is retried by the next lookup
//!
//! ## Example
//!
//! ```rust
//! use modpreview_loader::cache::{CacheConfig, MemoCache};
//! use modpreview_loader::ExpiryToken;
//!
//! # async fn example() -> modpreview_loader::Result<()> {
//! let cache: MemoCache<String, usize> = MemoCache::new(
//!     CacheConfig::assets(),
//!     |path: String| async move { Ok(path.len()) },
//!     |path, _value| async move { ExpiryToken::new(path) },
//! );
//!
//! assert_eq!(cache.get("gfx/flags/GER.tga".to_string()).await?, 17);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod invalidation;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, CacheMetadata, SharedResult};
pub use invalidation::{InvalidationEvent, InvalidationReason};
pub use store::MemoCache;
pub use types::CacheStats;
