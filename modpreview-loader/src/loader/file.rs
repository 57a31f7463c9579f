//! File-backed loaders: one source file plus an injected analysis

use crate::error::{LoaderError, Result};
use crate::loader::base::{Loader, LoaderCell};
use crate::loader::bundle::{LoadResult, Warning};
use crate::loader::progress::ProgressRelay;
use crate::loader::session::LoaderSession;
use crate::source::{ResourceId, ResourceSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A dependency a file declares about itself in a `#!kind:path` comment line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub kind: String,
    pub path: String,
}

/// Extract `#!kind:path` declarations, e.g. `#!gfx:interface/extra.gfx`
pub fn parse_declared_dependencies(text: &str) -> Vec<Dependency> {
    text.lines()
        .filter_map(|line| line.trim_start().strip_prefix("#!"))
        .filter_map(|decl| {
            let (kind, path) = decl.split_once(':')?;
            let (kind, path) = (kind.trim(), path.trim());
            (!kind.is_empty() && !path.is_empty()).then(|| Dependency {
                kind: kind.to_string(),
                path: path.to_string(),
            })
        })
        .collect()
}

/// Declared dependencies of one kind, in declaration order
pub fn dependencies_of_kind<'a>(dependencies: &'a [Dependency], kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    dependencies
        .iter()
        .filter(move |d| d.kind == kind)
        .map(|d| d.path.as_str())
}

/// What the analysis function gets to see
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    /// Resource identifier of the file
    pub path: &'a str,

    /// Text content; `None` if reading failed
    pub content: Option<&'a str>,

    /// Where the file was actually found
    pub resolved_path: Option<&'a Path>,

    /// Declared dependencies found in the content
    pub dependencies: &'a [Dependency],

    /// Read failure, if any
    pub error: Option<&'a LoaderError>,
}

impl<'a> AnalysisInput<'a> {
    /// The content, or the read failure unchanged
    pub fn require_content(&self) -> Result<&'a str> {
        if let Some(error) = self.error {
            return Err(error.clone());
        }
        self.content
            .ok_or_else(|| LoaderError::io(self.path, "no content"))
    }
}

/// Result of an analysis: the value plus whatever else it depended on
#[derive(Debug, Clone)]
pub struct Analysis<T> {
    pub value: T,
    pub dependencies: Vec<ResourceId>,
    pub warnings: Vec<Warning>,
}

impl<T> Analysis<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            dependencies: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_dependencies<I, R>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        self.dependencies.extend(resources.into_iter().map(Into::into));
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = Warning>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

/// Interpretation of one file's content.
///
/// An analyzer needing other resources must load them through other
/// loaders and report their dependencies, never read them directly.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    type Output: Send + Sync + 'static;

    /// Name used in the loader label
    fn name(&self) -> &'static str {
        "FileLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, session: &LoaderSession) -> Result<Analysis<Self::Output>>;
}

/// Loader reading a single file and delegating interpretation to `A`
pub struct FileLoader<A: ContentAnalyzer> {
    cell: LoaderCell<A::Output>,
    path: ResourceId,
    analyzer: A,
}

impl<A: ContentAnalyzer> FileLoader<A> {
    pub fn new(
        path: impl Into<ResourceId>,
        analyzer: A,
        source: Arc<dyn ResourceSource>,
        progress: ProgressRelay,
    ) -> Self {
        let path = path.into();
        let label = format!("[{} {}]", analyzer.name(), path);

        Self {
            cell: LoaderCell::new(label, source, progress),
            path,
            analyzer,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }
}

#[async_trait]
impl<A: ContentAnalyzer> Loader for FileLoader<A> {
    type Output = A::Output;

    fn cell(&self) -> &LoaderCell<A::Output> {
        &self.cell
    }

    async fn load_impl(&self, session: &LoaderSession) -> Result<LoadResult<A::Output>> {
        let source = self.cell.source().clone();

        // Token first: a change during the read then shows up next time
        session.token_of(source.as_ref(), &self.path).await;
        let read = source.read(&self.path).await;
        session.throw_if_cancelled()?;

        let (text, resolved_path, error) = match read {
            Ok(content) => (Some(content.text()), Some(content.resolved_path), None),
            Err(e) => (None, None, Some(e)),
        };
        let declared = text
            .as_deref()
            .map(parse_declared_dependencies)
            .unwrap_or_default();

        let input = AnalysisInput {
            path: &self.path,
            content: text.as_deref(),
            resolved_path: resolved_path.as_deref(),
            dependencies: &declared,
            error: error.as_ref(),
        };
        let analysis = self.analyzer.analyze(input, session).await?;
        session.throw_if_cancelled()?;

        Ok(LoadResult::new(analysis.value)
            .with_dependency(self.path.clone())
            .with_dependencies(analysis.dependencies)
            .with_warnings(analysis.warnings))
    }
}
