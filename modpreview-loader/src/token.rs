//! Expiry tokens: cheap, comparable fingerprints of resource content

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fingerprint of a resource's observable content.
///
/// Equal tokens mean the resource can be treated as unchanged. A token may
/// change without the content changing (a spurious recompute), never the
/// other way round.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpiryToken(String);

impl ExpiryToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token of a resource that does not exist
    pub fn missing() -> Self {
        Self("missing".to_string())
    }

    /// Combine component tokens into one, in order. Each part is prefixed
    /// with its byte length, so distinct part lists never compose equal.
    pub fn compose<'a>(parts: impl IntoIterator<Item = &'a ExpiryToken>) -> Self {
        let composed = parts
            .into_iter()
            .map(|t| format!("{}:{}", t.0.len(), t.0))
            .collect::<Vec<_>>()
            .concat();
        Self(composed)
    }

    pub fn is_missing(&self) -> bool {
        self.0 == "missing"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExpiryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExpiryToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExpiryToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
