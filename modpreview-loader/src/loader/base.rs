//! The Loader abstraction: a unit of recomputation with its own cached bundle

use crate::error::{LoaderError, Result};
use crate::loader::bundle::LoadResult;
use crate::loader::progress::{ProgressEvent, ProgressPhase, ProgressRelay};
use crate::loader::session::{LoaderSession, Visit, VisitOutcome};
use crate::source::{ResourceId, ResourceSource};
use crate::token::ExpiryToken;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a loader instance, stable for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LoaderId(u64);

impl LoaderId {
    pub fn next() -> Self {
        Self(NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of recomputation producing a value, its dependencies and warnings.
///
/// Implementors supply [`load_impl`](Loader::load_impl) and a
/// [`LoaderCell`] holding the cached state; [`load`](Loader::load) decides
/// whether `load_impl` has to run at all.
#[async_trait]
pub trait Loader: Send + Sync {
    type Output: Send + Sync + 'static;

    fn cell(&self) -> &LoaderCell<Self::Output>;

    /// Compute a fresh bundle. Sub-loads go through other loaders' `load`,
    /// and their dependencies must be merged into the returned bundle.
    async fn load_impl(&self, session: &LoaderSession) -> Result<LoadResult<Self::Output>>;

    /// Ask for recomputation although no dependency changed
    async fn should_reload(&self, _session: &LoaderSession) -> bool {
        false
    }

    async fn load(&self, session: &LoaderSession) -> Result<Arc<LoadResult<Self::Output>>> {
        self.cell().run(self, session).await
    }

    /// Load in a fresh session and return the value only
    async fn get_value(&self, force: bool) -> Result<Self::Output>
    where
        Self: Sized,
        Self::Output: Clone,
    {
        let session = LoaderSession::new(force);
        Ok(self.load(&session).await?.value.clone())
    }

    fn id(&self) -> LoaderId {
        self.cell().id()
    }

    /// Diagnostic name, e.g. `[TechnologyTreeLoader common/technologies/infantry.txt]`
    fn label(&self) -> &str {
        self.cell().label()
    }
}

/// Last committed bundle and the tokens of its dependencies at that time
struct Snapshot<T> {
    bundle: Arc<LoadResult<T>>,
    tokens: Vec<(ResourceId, ExpiryToken)>,
}

/// State shared by every loader: identity, the last bundle, and the gate
/// serializing computations on this instance.
pub struct LoaderCell<T> {
    id: LoaderId,
    label: String,
    source: Arc<dyn ResourceSource>,
    progress: ProgressRelay,
    gate: tokio::sync::Mutex<()>,
    last: RwLock<Option<Snapshot<T>>>,
}

impl<T: Send + Sync + 'static> LoaderCell<T> {
    pub fn new(label: impl Into<String>, source: Arc<dyn ResourceSource>, progress: ProgressRelay) -> Self {
        Self {
            id: LoaderId::next(),
            label: label.into(),
            source,
            progress,
            gate: tokio::sync::Mutex::new(()),
            last: RwLock::new(None),
        }
    }

    pub fn id(&self) -> LoaderId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &Arc<dyn ResourceSource> {
        &self.source
    }

    pub fn progress(&self) -> &ProgressRelay {
        &self.progress
    }

    /// Last committed bundle, possibly stale
    pub fn last_bundle(&self) -> Option<Arc<LoadResult<T>>> {
        self.last.read().as_ref().map(|s| s.bundle.clone())
    }

    /// Drop the committed bundle; the next load recomputes
    pub fn invalidate(&self) {
        *self.last.write() = None;
    }

    /// Report free-form progress from inside `load_impl`
    pub fn report(&self, detail: impl Into<String>) {
        self.emit(ProgressPhase::Progress, detail);
    }

    fn emit(&self, phase: ProgressPhase, detail: impl Into<String>) {
        self.progress.emit(ProgressEvent {
            loader: self.label.clone(),
            phase,
            detail: detail.into(),
        });
    }

    /// The load protocol:
    /// 1. a loader reached again below itself is a genuine cycle: it answers
    ///    with its last bundle, possibly stale, and the session stops
    ///    committing anything
    /// 2. a loader reached again elsewhere in the session (a diamond) answers
    ///    with the outcome of its first visit, awaiting it if still in flight
    /// 3. computations on one instance are serialized; a caller arriving
    ///    during another session's computation waits, then usually finds a
    ///    fresh bundle
    /// 4. unless forced, a bundle whose dependency tokens are unchanged is
    ///    returned without running `load_impl`
    /// 5. nothing is committed once the session is cancelled
    pub async fn run<L>(&self, loader: &L, session: &LoaderSession) -> Result<Arc<LoadResult<T>>>
    where
        L: Loader<Output = T> + ?Sized,
    {
        session.throw_if_cancelled()?;

        if session.is_ancestor(self.id) {
            return self.break_cycle(session);
        }

        match session.visit(self.id, &self.label) {
            Some(Visit::Done(outcome)) => return self.recorded(&outcome),
            Some(Visit::InFlight(done)) => return self.join_visit(session, done).await,
            None => {}
        }

        let mut visit = VisitGuard::<T>::new(session, self.id);
        let outcome = self.compute(loader, &session.within(self.id)).await;
        visit.finish(outcome.clone());
        outcome
    }

    fn break_cycle(&self, session: &LoaderSession) -> Result<Arc<LoadResult<T>>> {
        warn!(
            "{} depends on itself; session {} answers with its last bundle and commits nothing",
            self.label,
            session.id()
        );
        session.taint();
        self.last_bundle().ok_or_else(|| LoaderError::Cycle {
            loader: self.label.clone(),
        })
    }

    /// Await the first visit of this loader in `session`
    async fn join_visit(&self, session: &LoaderSession, done: CancellationToken) -> Result<Arc<LoadResult<T>>> {
        let Some(_wait) = session.begin_wait(self.id) else {
            return self.break_cycle(session);
        };

        debug!("{} joins its computation in flight in session {}", self.label, session.id());
        tokio::select! {
            _ = done.cancelled() => {}
            _ = session.cancelled() => return Err(LoaderError::Cancelled),
        }

        match session.outcome(self.id) {
            Some(outcome) => self.recorded(&outcome),
            None => Err(LoaderError::Other(format!("{} finished without an outcome", self.label))),
        }
    }

    fn recorded(&self, outcome: &VisitOutcome) -> Result<Arc<LoadResult<T>>> {
        match outcome.downcast_ref::<Result<Arc<LoadResult<T>>>>() {
            Some(result) => result.clone(),
            None => Err(LoaderError::Other(format!(
                "{} recorded an outcome of another type",
                self.label
            ))),
        }
    }

    async fn compute<L>(&self, loader: &L, session: &LoaderSession) -> Result<Arc<LoadResult<T>>>
    where
        L: Loader<Output = T> + ?Sized,
    {
        let _guard = tokio::select! {
            guard = self.gate.lock() => guard,
            _ = session.cancelled() => return Err(LoaderError::Cancelled),
        };
        session.throw_if_cancelled()?;

        if !session.force() {
            if let Some(bundle) = self.fresh_bundle(loader, session).await? {
                debug!("{} reused", self.label);
                self.emit(ProgressPhase::Reused, "");
                return Ok(bundle);
            }
        }

        debug!("{} recomputing (force: {})", self.label, session.force());
        self.emit(ProgressPhase::Started, "");

        let result = loader.load_impl(session).await;
        if session.is_cancelled() {
            self.emit(ProgressPhase::Cancelled, "");
            return Err(LoaderError::Cancelled);
        }

        let bundle = match result {
            Ok(bundle) => bundle,
            Err(e) => {
                if e.is_cancelled() {
                    self.emit(ProgressPhase::Cancelled, "");
                } else {
                    warn!("{} failed: {}", self.label, e);
                    self.emit(ProgressPhase::Failed, e.to_string());
                }
                return Err(e);
            }
        };

        let mut tokens = Vec::with_capacity(bundle.dependencies.len());
        for resource in &bundle.dependencies {
            let token = session.token_of(self.source.as_ref(), resource).await;
            tokens.push((resource.clone(), token));
        }
        session.throw_if_cancelled()?;

        let bundle = Arc::new(bundle);
        if session.is_tainted() {
            debug!("{} not committed: session {} broke a cycle", self.label, session.id());
        } else {
            *self.last.write() = Some(Snapshot {
                bundle: bundle.clone(),
                tokens,
            });
        }

        self.emit(
            ProgressPhase::Finished,
            format!(
                "{} dependencies, {} warnings",
                bundle.dependencies.len(),
                bundle.warnings.len()
            ),
        );

        Ok(bundle)
    }

    /// The committed bundle if every recorded token still matches
    async fn fresh_bundle<L>(&self, loader: &L, session: &LoaderSession) -> Result<Option<Arc<LoadResult<T>>>>
    where
        L: Loader<Output = T> + ?Sized,
    {
        let snapshot = self
            .last
            .read()
            .as_ref()
            .map(|s| (s.bundle.clone(), s.tokens.clone()));
        let Some((bundle, tokens)) = snapshot else {
            return Ok(None);
        };

        if loader.should_reload(session).await {
            debug!("{} asked to reload", self.label);
            return Ok(None);
        }

        for (resource, recorded) in &tokens {
            let current = session.token_of(self.source.as_ref(), resource).await;
            session.throw_if_cancelled()?;
            if &current != recorded {
                debug!("{} is stale: {} changed", self.label, resource);
                return Ok(None);
            }
        }

        Ok(Some(bundle))
    }
}

/// Records the outcome of a first visit, or `Cancelled` if the computation
/// is dropped before finishing, so no other caller awaits it forever.
struct VisitGuard<'a, T: Send + Sync + 'static> {
    session: &'a LoaderSession,
    loader: LoaderId,
    finished: bool,
    _output: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync + 'static> VisitGuard<'a, T> {
    fn new(session: &'a LoaderSession, loader: LoaderId) -> Self {
        Self {
            session,
            loader,
            finished: false,
            _output: PhantomData,
        }
    }

    fn finish(&mut self, outcome: Result<Arc<LoadResult<T>>>) {
        self.finished = true;
        self.session.finish_visit(self.loader, Arc::new(outcome));
    }
}

impl<T: Send + Sync + 'static> Drop for VisitGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            let outcome: Result<Arc<LoadResult<T>>> = Err(LoaderError::Cancelled);
            self.session.finish_visit(self.loader, Arc::new(outcome));
        }
    }
}

impl<T> fmt::Debug for LoaderCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderCell")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("loaded", &self.last.read().is_some())
            .finish()
    }
}
