//! Process-wide preview state, constructed once and passed explicitly

use crate::config::PreviewConfig;
use crate::gui::{gui_file_loader, GuiFileLoader};
use crate::sprite::SpriteCaches;
use crate::technology::{technology_tree_loader, TechnologyTreeLoader};
use crate::worldmap::WorldMapLoader;
use modpreview_loader::{LayeredFileSource, LoaderRegistry, ProgressRelay, ResourceSource};
use std::sync::Arc;
use tracing::info;

/// Shared state of every preview: configuration, where files come from,
/// the progress stream, sprite caches, and GUI loaders reused across
/// technology trees.
#[derive(Clone)]
pub struct PreviewContext {
    config: PreviewConfig,
    source: Arc<dyn ResourceSource>,
    progress: ProgressRelay,
    sprites: SpriteCaches,
    gui_loaders: Arc<LoaderRegistry<GuiFileLoader>>,
}

impl PreviewContext {
    /// Context reading from the configured mod and game roots
    pub fn new(config: PreviewConfig) -> Self {
        let roots = config.search_roots();
        info!("Search roots: {:?}", roots);
        let source: Arc<dyn ResourceSource> = Arc::new(LayeredFileSource::new(roots));
        Self::with_source(config, source)
    }

    pub fn with_source(config: PreviewConfig, source: Arc<dyn ResourceSource>) -> Self {
        let progress = ProgressRelay::default();
        let sprites = SpriteCaches::new(source.clone(), config.cache_config());

        let gui_loaders = {
            let (source, progress) = (source.clone(), ProgressRelay::child_of(&progress));
            Arc::new(LoaderRegistry::new(move |path| {
                gui_file_loader(path, source.clone(), progress.clone())
            }))
        };

        Self {
            config,
            source,
            progress,
            sprites,
            gui_loaders,
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn ResourceSource> {
        &self.source
    }

    /// Root relay; every loader created here reports to it
    pub fn progress(&self) -> &ProgressRelay {
        &self.progress
    }

    pub fn sprites(&self) -> &SpriteCaches {
        &self.sprites
    }

    pub fn gui_loaders(&self) -> &Arc<LoaderRegistry<GuiFileLoader>> {
        &self.gui_loaders
    }

    pub fn technology_tree_loader(&self, path: &str) -> TechnologyTreeLoader {
        technology_tree_loader(
            path,
            self.gui_loaders.clone(),
            self.source.clone(),
            ProgressRelay::child_of(&self.progress),
        )
    }

    pub fn world_map_loader(&self) -> WorldMapLoader {
        WorldMapLoader::new(
            self.source.clone(),
            ProgressRelay::child_of(&self.progress),
            self.config.enable_supply_area,
        )
    }
}
