//! # Loaders
//!
//! Incremental, dependency-tracked recomputation. A [`Loader`] produces a
//! [`LoadResult`] (`value`, `dependencies`, `warnings`) and keeps it,
//! together with the expiry tokens of its dependencies, so that a later load
//! can answer "still valid?" from metadata alone.
//!
//! - [`FileLoader`] reads one file and hands the content to a
//!   [`ContentAnalyzer`]
//! - composite loaders implement [`Loader`] directly, load sub-loaders and
//!   combine them with [`merge_dependencies`] and [`merge_warnings`]
//! - a [`LoaderSession`] carries cancellation and the force flag through
//!   one request
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use modpreview_loader::loader::{
//!     Analysis, AnalysisInput, ContentAnalyzer, FileLoader, Loader, LoaderSession, ProgressRelay,
//! };
//! use modpreview_loader::{MemorySource, Result};
//!
//! struct LineCount;
//!
//! #[async_trait]
//! impl ContentAnalyzer for LineCount {
//!     type Output = usize;
//!
//!     async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<usize>> {
//!         Ok(Analysis::new(input.require_content()?.lines().count()))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let source = Arc::new(MemorySource::new());
//! source.insert("common/ideas.txt", "a\nb\n");
//!
//! let loader = FileLoader::new("common/ideas.txt", LineCount, source, ProgressRelay::default());
//! let result = loader.load(&LoaderSession::new(false)).await?;
//! assert_eq!(result.value, 2);
//! assert!(result.dependencies.contains("common/ideas.txt"));
//! # Ok(())
//! # }
//! ```

pub mod base;
pub mod bundle;
pub mod file;
pub mod progress;
pub mod registry;
pub mod session;

pub use base::{Loader, LoaderCell, LoaderId};
pub use bundle::{merge_dependencies, merge_warnings, or_degraded, Bundle, Dependencies, LoadResult, Position, Warning};
pub use file::{
    dependencies_of_kind, parse_declared_dependencies, Analysis, AnalysisInput, ContentAnalyzer, Dependency,
    FileLoader,
};
pub use progress::{ProgressEvent, ProgressPhase, ProgressRelay};
pub use registry::LoaderRegistry;
pub use session::{LoaderSession, SessionSlot, Visit, VisitOutcome, WaitGuard};
