//! # modpreview-loader
//!
//! Incremental, dependency-tracked loading and caching for previewing game
//! mod assets while their files change on disk.
//!
//! ## Features
//!
//! - Memoizing async cache with expiry tokens and lazy time-to-live
//!   ([`cache::MemoCache`])
//! - Loaders that skip recomputation when no dependency changed
//!   ([`loader::Loader`], [`loader::FileLoader`])
//! - Bottom-up dependency aggregation through composite loaders
//! - Cooperative cancellation of superseded requests
//!   ([`loader::LoaderSession`], [`loader::SessionSlot`])
//! - Progress events relayed from nested loaders ([`loader::ProgressRelay`])
//!
//! ## Storage
//!
//! All reads and fingerprints go through a [`ResourceSource`]:
//! [`LayeredFileSource`] searches mod roots before the game root,
//! [`MemorySource`] keeps everything in memory.

pub mod cache;
pub mod error;
pub mod loader;
pub mod source;
pub mod token;

// Re-export main types for convenience
pub use cache::{CacheConfig, CacheConfigBuilder, CacheStats, InvalidationReason, MemoCache};
pub use error::{LoaderError, Result};
pub use loader::{
    merge_dependencies, merge_warnings, or_degraded, Analysis, AnalysisInput, Bundle, ContentAnalyzer, Dependency,
    FileLoader, LoadResult, Loader, LoaderCell, LoaderRegistry, LoaderSession, Position, ProgressEvent, ProgressPhase,
    ProgressRelay, SessionSlot, Warning,
};
pub use source::{LayeredFileSource, MemorySource, ResourceContent, ResourceId, ResourceSource};
pub use token::ExpiryToken;
