//! Result bundles and the merge rules used by composite loaders

use crate::error::Result;
use crate::source::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Resources a value was computed from, in stable (sorted) order
pub type Dependencies = BTreeSet<ResourceId>;

/// Line and column inside a source file, both 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// Informational diagnostic; never aborts a load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub source: ResourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Warning {
    pub fn new(source: impl Into<ResourceId>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

/// `{ value, dependencies, warnings }` produced by every load.
///
/// `dependencies` must cover every resource read to produce `value`;
/// a missing entry means the value never goes stale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResult<T> {
    pub value: T,
    pub dependencies: Dependencies,
    pub warnings: Vec<Warning>,
}

impl<T> LoadResult<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            dependencies: Dependencies::new(),
            warnings: Vec::new(),
        }
    }

    /// Stand-in for a sub-loader that is switched off
    pub fn empty() -> Self
    where
        T: Default,
    {
        Self::new(T::default())
    }

    pub fn with_dependency(mut self, resource: impl Into<ResourceId>) -> Self {
        self.dependencies.insert(resource.into());
        self
    }

    pub fn with_dependencies<I, R>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        self.dependencies.extend(resources.into_iter().map(Into::into));
        self
    }

    pub fn with_warning(mut self, warning: Warning) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = Warning>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LoadResult<U> {
        LoadResult {
            value: f(self.value),
            dependencies: self.dependencies,
            warnings: self.warnings,
        }
    }
}

/// Value-independent view of a bundle, so bundles of different value types
/// can be merged together.
pub trait Bundle {
    fn dependencies(&self) -> &Dependencies;
    fn warnings(&self) -> &[Warning];
}

impl<T> Bundle for LoadResult<T> {
    fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// Deduplicated union of the dependencies of every bundle
pub fn merge_dependencies(bundles: &[&dyn Bundle]) -> Dependencies {
    bundles
        .iter()
        .flat_map(|b| b.dependencies().iter().cloned())
        .collect()
}

/// Warnings of every bundle, concatenated in the order given
pub fn merge_warnings(bundles: &[&dyn Bundle]) -> Vec<Warning> {
    bundles
        .iter()
        .flat_map(|b| b.warnings().iter().cloned())
        .collect()
}

/// Replace an `Io` failure of a non-primary sub-loader by an empty bundle
/// carrying a warning. The bundle still depends on `resource`, so the file
/// appearing later invalidates it. Other errors pass through.
pub fn or_degraded<T: Default>(
    result: Result<Arc<LoadResult<T>>>,
    resource: &str,
) -> Result<Arc<LoadResult<T>>> {
    match result {
        Err(e) if e.is_io() => {
            warn!("Degrading {} to an empty result: {}", resource, e);
            Ok(Arc::new(
                LoadResult::empty()
                    .with_dependency(resource)
                    .with_warning(Warning::new(resource, e.to_string())),
            ))
        }
        other => other,
    }
}
