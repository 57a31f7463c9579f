//! Resource sources: content reading and expiry tokens
//!
//! A [`ResourceSource`] is the only way the framework touches storage. It
//! answers two questions about a resource identifier: what are its bytes,
//! and what is its current [`ExpiryToken`].

use crate::error::{LoaderError, Result};
use crate::token::ExpiryToken;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// Resource identifier: a path relative to the search roots
pub type ResourceId = String;

/// Raw content of a resource together with where it was found
#[derive(Debug, Clone)]
pub struct ResourceContent {
    pub bytes: Vec<u8>,
    pub resolved_path: PathBuf,
}

impl ResourceContent {
    /// Content as UTF-8 text, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Content reader and expiry token source
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Read a resource; fails with [`LoaderError::Io`] if absent or unreadable
    async fn read(&self, resource: &str) -> Result<ResourceContent>;

    /// Current fingerprint of a resource; never fails
    async fn token(&self, resource: &str) -> ExpiryToken;
}

/// File system source searching several roots in order.
///
/// Mod roots come first and the game root last, so a file present in a mod
/// overrides the base game file of the same relative path.
#[derive(Debug, Clone)]
pub struct LayeredFileSource {
    roots: Vec<PathBuf>,
}

impl LayeredFileSource {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Find the first root containing `resource`
    pub async fn resolve(&self, resource: &str) -> Option<(PathBuf, std::fs::Metadata)> {
        let relative = Path::new(resource);
        if relative.is_absolute() {
            let metadata = tokio::fs::metadata(relative).await.ok()?;
            return metadata.is_file().then(|| (relative.to_path_buf(), metadata));
        }

        for root in &self.roots {
            let candidate = root.join(relative);
            if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
                if metadata.is_file() {
                    return Some((candidate, metadata));
                }
            }
        }

        None
    }
}

#[async_trait]
impl ResourceSource for LayeredFileSource {
    async fn read(&self, resource: &str) -> Result<ResourceContent> {
        let (path, _) = self
            .resolve(resource)
            .await
            .ok_or_else(|| LoaderError::io(resource, "not found in any search root"))?;

        debug!("Reading {} from {}", resource, path.display());
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| LoaderError::io(resource, e))?;

        Ok(ResourceContent {
            bytes,
            resolved_path: path,
        })
    }

    async fn token(&self, resource: &str) -> ExpiryToken {
        match self.resolve(resource).await {
            Some((path, metadata)) => {
                let modified = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                ExpiryToken::new(format!("{}|{}|{}", path.display(), modified, metadata.len()))
            }
            None => ExpiryToken::missing(),
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    bytes: Vec<u8>,
    revision: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<ResourceId, MemoryEntry>,
    reads: HashMap<ResourceId, usize>,
    next_revision: u64,
}

/// In-memory source with explicit revisions.
///
/// Every write bumps a global revision counter, so rewriting a resource
/// always changes its token even when the bytes are identical.
#[derive(Debug, Default)]
pub struct MemorySource {
    state: RwLock<MemoryState>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a resource
    pub fn insert(&self, resource: impl Into<ResourceId>, content: impl Into<Vec<u8>>) {
        let mut state = self.state.write();
        state.next_revision += 1;
        let revision = state.next_revision;
        state.entries.insert(
            resource.into(),
            MemoryEntry {
                bytes: content.into(),
                revision,
            },
        );
    }

    pub fn remove(&self, resource: &str) -> bool {
        self.state.write().entries.remove(resource).is_some()
    }

    /// Number of successful and failed reads of `resource` so far
    pub fn read_count(&self, resource: &str) -> usize {
        self.state.read().reads.get(resource).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ResourceSource for MemorySource {
    async fn read(&self, resource: &str) -> Result<ResourceContent> {
        let mut state = self.state.write();
        *state.reads.entry(resource.to_string()).or_default() += 1;

        let entry = state
            .entries
            .get(resource)
            .ok_or_else(|| LoaderError::io(resource, "no such resource"))?;

        Ok(ResourceContent {
            bytes: entry.bytes.clone(),
            resolved_path: PathBuf::from(format!("memory://{}", resource)),
        })
    }

    async fn token(&self, resource: &str) -> ExpiryToken {
        match self.state.read().entries.get(resource) {
            Some(entry) => ExpiryToken::new(format!("rev:{}", entry.revision)),
            None => ExpiryToken::missing(),
        }
    }
}
