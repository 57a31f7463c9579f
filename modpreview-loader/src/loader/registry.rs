//! Sub-loaders created on demand and kept per resource path

use crate::error::Result;
use crate::loader::base::Loader;
use crate::loader::bundle::LoadResult;
use crate::loader::session::LoaderSession;
use crate::source::ResourceId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Keeps one loader per path so its cached bundle survives between loads
/// of the composite that owns the registry.
pub struct LoaderRegistry<L> {
    loaders: Mutex<HashMap<ResourceId, Arc<L>>>,
    factory: Box<dyn Fn(&str) -> L + Send + Sync>,
}

impl<L: Loader> LoaderRegistry<L> {
    pub fn new(factory: impl Fn(&str) -> L + Send + Sync + 'static) -> Self {
        Self {
            loaders: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Loader for `path`, created on first use
    pub fn get(&self, path: &str) -> Arc<L> {
        self.loaders
            .lock()
            .entry(path.to_string())
            .or_insert_with(|| Arc::new((self.factory)(path)))
            .clone()
    }

    /// Load each path in order, stopping at the first error or cancellation
    pub async fn load_multiple<S: AsRef<str>>(
        &self,
        paths: &[S],
        session: &LoaderSession,
    ) -> Result<Vec<Arc<LoadResult<L::Output>>>> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            session.throw_if_cancelled()?;
            let loader = self.get(path.as_ref());
            results.push(loader.load(session).await?);
        }
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.loaders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.lock().is_empty()
    }
}
