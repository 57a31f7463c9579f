//! Statistics for cache monitoring

use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics and metrics for cache performance monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by an existing entry
    pub hits: u64,

    /// Lookups that found no entry for the key
    pub misses: u64,

    /// Entries replaced because their time-to-live elapsed
    pub replaced_expired: u64,

    /// Entries replaced because the expiry token changed
    pub replaced_token: u64,

    /// Entries replaced because the previous computation failed
    pub retried_failures: u64,

    /// Entries removed by hand (`remove`, `clear`)
    pub invalidations: u64,

    /// Number of entries currently in cache
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.computations();
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Number of times the factory was started
    pub fn computations(&self) -> u64 {
        self.misses + self.replaced_expired + self.replaced_token + self.retried_failures
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, replaced: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.replaced_expired + self.replaced_token + self.retried_failures
        )
    }
}
