//! Configuration for memo caches

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`MemoCache`](crate::cache::MemoCache)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Maximum age of an entry, measured from its creation
    pub life: Duration,

    /// Life jitter factor (0.0 - 1.0)
    /// Spreads out recomputation of entries created at the same moment
    pub ttl_jitter: f64,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            life: Duration::from_secs(10 * 60),
            ttl_jitter: 0.0,
            enable_metrics: true,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.life.is_zero() {
            return Err(LoaderError::Config("life must be greater than 0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(LoaderError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Calculate actual life with jitter applied
    pub fn life_with_jitter(&self) -> Duration {
        if self.ttl_jitter == 0.0 {
            return self.life;
        }

        let base_secs = self.life.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(0.001);

        Duration::from_secs_f64(final_secs)
    }

    /// Asset caches (images, sprites, gfx maps): ten minutes
    pub fn assets() -> Self {
        Self::default()
    }

    /// Short-lived derived data: thirty seconds
    pub fn short_lived() -> Self {
        Self {
            life: Duration::from_secs(30),
            ..Default::default()
        }
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    life: Option<Duration>,
    ttl_jitter: Option<f64>,
    enable_metrics: Option<bool>,
}

impl CacheConfigBuilder {
    /// Set entry life
    pub fn life(mut self, life: Duration) -> Self {
        self.life = Some(life);
        self
    }

    /// Set life jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            life: self.life.unwrap_or(defaults.life),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
        }
    }
}
