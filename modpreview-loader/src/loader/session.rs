//! Per-request loader sessions and cancellation

use crate::error::{LoaderError, Result};
use crate::loader::LoaderId;
use crate::source::{ResourceId, ResourceSource};
use crate::token::ExpiryToken;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Type-erased outcome of one loader in one session. Holds the
/// `Result<Arc<LoadResult<T>>>` of that loader's output type.
pub type VisitOutcome = Arc<dyn Any + Send + Sync>;

/// What a session knows about a loader it reached before
#[derive(Debug, Clone)]
pub enum Visit {
    /// Being computed; the token fires once the outcome is recorded
    InFlight(CancellationToken),
    Done(VisitOutcome),
}

/// A computation waiting for another loader's in-flight visit
#[derive(Debug)]
struct Waiter {
    id: u64,
    /// Loaders whose computation is blocked by this wait
    path: Vec<LoaderId>,
    target: LoaderId,
}

#[derive(Debug)]
struct SessionState {
    id: u64,
    force: bool,
    cancel: CancellationToken,
    visits: Mutex<BTreeMap<LoaderId, (String, Visit)>>,
    waiters: Mutex<Vec<Waiter>>,
    next_waiter: AtomicU64,
    tainted: AtomicBool,
    tokens: Mutex<HashMap<ResourceId, ExpiryToken>>,
}

/// Context of one externally triggered load request.
///
/// Passed by reference through the whole loader call tree. Holds:
/// - the cancellation signal (monotonic: once cancelled, always cancelled)
/// - the force flag, making every loader reached skip its staleness probe
/// - the visit of every loader reached, so a loader runs at most once per
///   request and a second caller awaits the first one's outcome
/// - the expiry tokens observed so far, so one request sees one token per
///   resource
///
/// Each loader hands its sub-loaders a scope of the session extended by its
/// own id ([`within`](Self::within)); a loader found among its own ancestors
/// is a genuine cycle, anything else reached twice is a diamond.
#[derive(Debug, Clone)]
pub struct LoaderSession {
    state: Arc<SessionState>,
    path: Vec<LoaderId>,
}

impl LoaderSession {
    pub fn new(force: bool) -> Self {
        Self::with_cancellation(force, CancellationToken::new())
    }

    /// Session cancelled through an externally owned token
    pub fn with_cancellation(force: bool, cancel: CancellationToken) -> Self {
        Self {
            state: Arc::new(SessionState {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                force,
                cancel,
                visits: Mutex::new(BTreeMap::new()),
                waiters: Mutex::new(Vec::new()),
                next_waiter: AtomicU64::new(0),
                tainted: AtomicBool::new(false),
                tokens: Mutex::new(HashMap::new()),
            }),
            path: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn force(&self) -> bool {
        self.state.force
    }

    pub fn cancel(&self) {
        if !self.state.cancel.is_cancelled() {
            debug!("Cancelling loader session {}", self.state.id);
        }
        self.state.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancel.is_cancelled()
    }

    /// Fail with [`LoaderError::Cancelled`] once the session is cancelled
    pub fn throw_if_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LoaderError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the session is cancelled
    pub async fn cancelled(&self) {
        self.state.cancel.cancelled().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.state.cancel.clone()
    }

    /// Loaders currently computing on the way to this scope, outermost first
    pub fn path(&self) -> &[LoaderId] {
        &self.path
    }

    pub fn is_ancestor(&self, loader: LoaderId) -> bool {
        self.path.contains(&loader)
    }

    /// Scope for the sub-loads of `loader`
    pub fn within(&self, loader: LoaderId) -> LoaderSession {
        let mut path = self.path.clone();
        path.push(loader);
        Self {
            state: self.state.clone(),
            path,
        }
    }

    /// Record the first visit of `loader` as in flight and return `None`,
    /// or return what an earlier visit left.
    pub fn visit(&self, loader: LoaderId, label: &str) -> Option<Visit> {
        let mut visits = self.state.visits.lock();
        if let Some((_, visit)) = visits.get(&loader) {
            return Some(visit.clone());
        }
        visits.insert(loader, (label.to_string(), Visit::InFlight(CancellationToken::new())));
        None
    }

    /// Store the outcome of `loader` and wake everyone awaiting it
    pub fn finish_visit(&self, loader: LoaderId, outcome: VisitOutcome) {
        let previous = {
            let mut visits = self.state.visits.lock();
            visits
                .get_mut(&loader)
                .map(|(_, visit)| std::mem::replace(visit, Visit::Done(outcome)))
        };
        if let Some(Visit::InFlight(done)) = previous {
            done.cancel();
        }
    }

    /// Outcome recorded for `loader`, if its visit finished
    pub fn outcome(&self, loader: LoaderId) -> Option<VisitOutcome> {
        match self.state.visits.lock().get(&loader) {
            Some((_, Visit::Done(outcome))) => Some(outcome.clone()),
            _ => None,
        }
    }

    pub fn has_visited(&self, loader: LoaderId) -> bool {
        self.state.visits.lock().contains_key(&loader)
    }

    /// Labels of visited loaders, in creation order of the loaders
    pub fn visited_loaders(&self) -> Vec<String> {
        self.state.visits.lock().values().map(|(label, _)| label.clone()).collect()
    }

    /// Register this scope as waiting for the in-flight visit of `target`.
    ///
    /// Returns `None` when `target` is, directly or through other waits,
    /// blocked on one of this scope's ancestors: waiting would never end.
    pub fn begin_wait(&self, target: LoaderId) -> Option<WaitGuard<'_>> {
        let mut waiters = self.state.waiters.lock();

        let mut blocked_on = vec![target];
        let mut seen = HashSet::new();
        while let Some(loader) = blocked_on.pop() {
            if self.is_ancestor(loader) {
                return None;
            }
            if seen.insert(loader) {
                blocked_on.extend(waiters.iter().filter(|w| w.path.contains(&loader)).map(|w| w.target));
            }
        }

        let id = self.state.next_waiter.fetch_add(1, Ordering::Relaxed);
        waiters.push(Waiter {
            id,
            path: self.path.clone(),
            target,
        });
        Some(WaitGuard { session: self, id })
    }

    /// Mark the session as having served a stale bundle to break a cycle;
    /// from then on no loader commits what it computes in this session
    pub fn taint(&self) {
        self.state.tainted.store(true, Ordering::SeqCst);
    }

    pub fn is_tainted(&self) -> bool {
        self.state.tainted.load(Ordering::SeqCst)
    }

    /// Token of `resource`, fetched at most once per session
    pub async fn token_of(&self, source: &dyn ResourceSource, resource: &str) -> ExpiryToken {
        let cached = self.state.tokens.lock().get(resource).cloned();
        if let Some(token) = cached {
            return token;
        }

        let token = source.token(resource).await;
        self.state
            .tokens
            .lock()
            .entry(resource.to_string())
            .or_insert(token)
            .clone()
    }
}

/// Removes its wait registration when dropped
pub struct WaitGuard<'a> {
    session: &'a LoaderSession,
    id: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.session.state.waiters.lock().retain(|w| w.id != self.id);
    }
}

/// Tracks the in-flight session of one logical preview target.
///
/// Starting a new session cancels the one it supersedes, so rapid document
/// switches do not pile up work.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Mutex<Option<CancellationToken>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session, cancelling the previous one
    pub fn begin(&self, force: bool) -> Arc<LoaderSession> {
        let session = Arc::new(LoaderSession::new(force));
        let previous = self.current.lock().replace(session.cancellation_token());

        if let Some(previous) = previous {
            if !previous.is_cancelled() {
                info!("Session {} supersedes an in-flight load", session.id());
            }
            previous.cancel();
        }

        session
    }

    /// Cancel the current session, if any
    pub fn cancel_current(&self) {
        if let Some(current) = self.current.lock().take() {
            current.cancel();
        }
    }
}
