//! Preview configuration: search roots, feature toggles and timings

use anyhow::{Context, Result};
use modpreview_loader::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_GAME_ROOT: &str = "MODPREVIEW_GAME_ROOT";
pub const ENV_MOD_ROOTS: &str = "MODPREVIEW_MOD_ROOTS";
pub const ENV_ENABLE_SUPPLY_AREA: &str = "MODPREVIEW_ENABLE_SUPPLY_AREA";
pub const ENV_CACHE_LIFE_SECS: &str = "MODPREVIEW_CACHE_LIFE_SECS";
pub const ENV_POLL_MS: &str = "MODPREVIEW_POLL_MS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewConfig {
    /// Installation directory of the game, searched last
    pub game_root: PathBuf,

    /// Mod directories, searched in order before the game root
    pub mod_roots: Vec<PathBuf>,

    /// Show supply areas instead of railways and supply nodes
    pub enable_supply_area: bool,

    /// Life of sprite and image cache entries
    pub cache_life: Duration,

    /// Interval between reloads in watch mode
    pub poll_interval: Duration,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            game_root: PathBuf::from("."),
            mod_roots: Vec::new(),
            enable_supply_area: false,
            cache_life: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl PreviewConfig {
    pub fn builder() -> PreviewConfigBuilder {
        PreviewConfigBuilder::default()
    }

    /// Read the `MODPREVIEW_*` variables; unset ones keep their defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(root) = lookup(ENV_GAME_ROOT) {
            config.game_root = PathBuf::from(root);
        }

        if let Some(roots) = lookup(ENV_MOD_ROOTS) {
            config.mod_roots = std::env::split_paths(&roots)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }

        if let Some(value) = lookup(ENV_ENABLE_SUPPLY_AREA) {
            config.enable_supply_area = parse_bool(&value)
                .with_context(|| format!("Invalid {}", ENV_ENABLE_SUPPLY_AREA))?;
        }

        if let Some(value) = lookup(ENV_CACHE_LIFE_SECS) {
            let secs: u64 = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_CACHE_LIFE_SECS, value))?;
            config.cache_life = Duration::from_secs(secs);
        }

        if let Some(value) = lookup(ENV_POLL_MS) {
            let millis: u64 = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_POLL_MS, value))?;
            config.poll_interval = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.cache_config().validate()?;
        if self.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }
        Ok(())
    }

    /// Search roots in lookup order: mods first, the game last
    pub fn search_roots(&self) -> Vec<PathBuf> {
        self.mod_roots
            .iter()
            .cloned()
            .chain(std::iter::once(self.game_root.clone()))
            .collect()
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::builder().life(self.cache_life).build()
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {:?}", other),
    }
}

/// Builder for preview configuration
#[derive(Debug, Default)]
pub struct PreviewConfigBuilder {
    config: PreviewConfig,
}

impl PreviewConfigBuilder {
    pub fn game_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.game_root = root.into();
        self
    }

    pub fn mod_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.mod_roots.push(root.into());
        self
    }

    pub fn enable_supply_area(mut self, enable: bool) -> Self {
        self.config.enable_supply_area = enable;
        self
    }

    pub fn cache_life(mut self, life: Duration) -> Self {
        self.config.cache_life = life;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn build(self) -> PreviewConfig {
        self.config
    }
}
