//! Why cache entries are replaced or removed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason for cache invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Entry outlived its life
    Expired,

    /// The expiry token of the key no longer matches
    TokenChanged,

    /// The computation failed; failures are never kept
    Failed,

    /// Manual invalidation by key
    Manual,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "life expired"),
            InvalidationReason::TokenChanged => write!(f, "expiry token changed"),
            InvalidationReason::Failed => write!(f, "previous computation failed"),
            InvalidationReason::Manual => write!(f, "manual invalidation"),
        }
    }
}

/// Record of an invalidation sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub reason: InvalidationReason,

    /// Debug rendering of the affected keys
    pub keys: Vec<String>,

    pub timestamp: DateTime<Utc>,

    pub context: Option<String>,
}

impl InvalidationEvent {
    pub fn new(reason: InvalidationReason, keys: Vec<String>) -> Self {
        Self {
            reason,
            keys,
            timestamp: Utc::now(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}
