//! Progress relay: forwards loader progress to whoever observes a load

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default number of buffered events per relay
pub const DEFAULT_PROGRESS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Started,
    /// The cached bundle was still valid
    Reused,
    /// Free-form progress reported by the loader itself
    Progress,
    Finished,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub loader: String,
    pub phase: ProgressPhase,
    pub detail: String,
}

/// Broadcast channel for progress events.
///
/// A relay may be attached to parent relays; every event emitted on it is
/// also emitted on each parent, so a composite loader's subscribers see the
/// progress of all nested loaders. Emitting never blocks: with no
/// subscribers the event is dropped, and a lagging subscriber misses events.
#[derive(Clone)]
pub struct ProgressRelay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    tx: broadcast::Sender<ProgressEvent>,
    upstream: RwLock<Vec<ProgressRelay>>,
}

impl Default for ProgressRelay {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_CAPACITY)
    }
}

impl std::fmt::Debug for ProgressRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressRelay")
            .field("subscribers", &self.inner.tx.receiver_count())
            .field("upstream", &self.inner.upstream.read().len())
            .finish()
    }
}

impl ProgressRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(RelayInner {
                tx,
                upstream: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Create a relay that forwards to `parent`
    pub fn child_of(parent: &ProgressRelay) -> Self {
        let relay = Self::default();
        relay.attach_to(parent);
        relay
    }

    /// Subscribe to the event stream.
    ///
    /// Returns a receiver that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.tx.subscribe()
    }

    /// Forward every event emitted here to `parent` as well.
    ///
    /// Attachments that would make events loop back are refused.
    pub fn attach_to(&self, parent: &ProgressRelay) -> bool {
        if parent.reaches(self) {
            warn!("Refusing to attach progress relay: events would loop");
            return false;
        }

        let mut upstream = self.inner.upstream.write();
        if !upstream.iter().any(|p| Arc::ptr_eq(&p.inner, &parent.inner)) {
            upstream.push(parent.clone());
        }
        true
    }

    pub fn emit(&self, event: ProgressEvent) {
        trace!(loader = %event.loader, phase = ?event.phase, "{}", event.detail);

        let upstream = self.inner.upstream.read().clone();
        for parent in &upstream {
            parent.emit(event.clone());
        }

        // No receivers connected is fine
        let _ = self.inner.tx.send(event);
    }

    /// `self` is `target` or forwards to it, directly or transitively
    fn reaches(&self, target: &ProgressRelay) -> bool {
        if Arc::ptr_eq(&self.inner, &target.inner) {
            return true;
        }
        let upstream = self.inner.upstream.read().clone();
        upstream.iter().any(|p| p.reaches(target))
    }
}
