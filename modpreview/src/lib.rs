//! Game mod asset previews built on `modpreview-loader`

pub mod config;
pub mod context;
pub mod document;
pub mod gui;
pub mod sprite;
pub mod technology;
pub mod watch;
pub mod worldmap;

pub use config::{PreviewConfig, PreviewConfigBuilder};
pub use context::PreviewContext;
pub use gui::{GuiFile, GuiFileLoader, GuiFileLoaderResult};
pub use sprite::{Image, ImageFormat, Sprite, SpriteCaches};
pub use technology::{Technology, TechnologyTree, TechnologyTreeLoader, TechnologyTreeLoaderResult};
pub use watch::{watch, Outcome, WatchReport};
pub use worldmap::{WorldMap, WorldMapLoader};
