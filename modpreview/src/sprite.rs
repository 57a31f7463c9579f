//! Sprite, image and gfx lookups shared by every preview
//!
//! Three memo caches, all keyed by resource path:
//! - images, by texture path
//! - gfx maps (sprite name -> sprite type), by gfx file path
//! - sprites, by `gfx?name`, whose token combines the gfx file and the
//!   texture the sprite resolved to

use crate::document::parse_yaml;
use futures::future::join_all;
use modpreview_loader::{CacheConfig, CacheStats, ExpiryToken, LoaderError, MemoCache, ResourceSource, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Dds,
    Tga,
}

impl ImageFormat {
    pub fn from_path(resource: &str) -> Result<Self> {
        let extension = resource
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "png" => Ok(ImageFormat::Png),
            "dds" => Ok(ImageFormat::Dds),
            "tga" => Ok(ImageFormat::Tga),
            other => Err(LoaderError::UnsupportedFormat {
                resource: resource.to_string(),
                format: other.to_string(),
            }),
        }
    }
}

/// A texture found on disk. Pixels are not decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Resource actually read, after the `.dds` fallback
    pub resource: String,
    pub resolved_path: PathBuf,
    pub format: ImageFormat,
    pub byte_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteType {
    pub name: String,
    pub texturefile: String,
    #[serde(default = "one", rename = "noOfFrames")]
    pub frames: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bordersize: Option<BorderSize>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderSize {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprite {
    pub name: String,
    /// Texture named by the sprite type, before any fallback
    pub texture: String,
    pub image: Image,
    pub frames: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bordersize: Option<BorderSize>,
}

#[derive(Debug, Deserialize)]
struct GfxFile {
    #[serde(default, rename = "spriteTypes")]
    sprite_types: Vec<SpriteType>,
}

pub type GfxMap = Arc<HashMap<String, SpriteType>>;

/// `.png`/`.tga` that may only exist as a `.dds` sibling
fn dds_sibling(resource: &str) -> Option<String> {
    let (stem, extension) = resource.rsplit_once('.')?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    (extension.eq_ignore_ascii_case("png") || extension.eq_ignore_ascii_case("tga")).then(|| format!("{}.dds", stem))
}

async fn read_image(source: &dyn ResourceSource, resource: &str) -> Result<Image> {
    let format = ImageFormat::from_path(resource)?;
    let content = source.read(resource).await?;
    Ok(Image {
        resource: resource.to_string(),
        resolved_path: content.resolved_path,
        format,
        byte_len: content.bytes.len(),
    })
}

/// Token of a texture and of the `.dds` sibling it may fall back to
async fn texture_token(source: &dyn ResourceSource, resource: &str) -> ExpiryToken {
    let own = source.token(resource).await;
    match dds_sibling(resource) {
        Some(fallback) => ExpiryToken::compose([&own, &source.token(&fallback).await]),
        None => own,
    }
}

/// Image for `resource`, or `None` when it is missing or unsupported
async fn load_image(source: Arc<dyn ResourceSource>, resource: String) -> Option<Image> {
    let first = read_image(source.as_ref(), &resource).await;
    let result = match (first, dds_sibling(&resource)) {
        (Err(LoaderError::Io { .. }), Some(fallback)) => {
            debug!("{} not found, trying {}", resource, fallback);
            read_image(source.as_ref(), &fallback).await
        }
        (result, _) => result,
    };

    match result {
        Ok(image) => Some(image),
        Err(e) => {
            error!("Failed to get image {}: {}", resource, e);
            None
        }
    }
}

/// Sprite types of a gfx file; an unreadable file yields an empty map
async fn load_gfx_map(source: Arc<dyn ResourceSource>, resource: String) -> GfxMap {
    let parsed = match source.read(&resource).await {
        Ok(content) => parse_yaml::<GfxFile>(&resource, &content.text()),
        Err(e) => Err(e),
    };

    match parsed {
        Ok(file) => Arc::new(file.sprite_types.into_iter().map(|s| (s.name.clone(), s)).collect()),
        Err(e) => {
            error!("{}", e);
            Arc::new(HashMap::new())
        }
    }
}

/// The process-wide sprite, image and gfx caches
#[derive(Clone)]
pub struct SpriteCaches {
    images: Arc<MemoCache<String, Option<Image>>>,
    gfx_maps: Arc<MemoCache<String, GfxMap>>,
    sprites: Arc<MemoCache<String, Option<Sprite>>>,
}

impl SpriteCaches {
    pub fn new(source: Arc<dyn ResourceSource>, config: CacheConfig) -> Self {
        let images = {
            let (factory_source, token_source) = (source.clone(), source.clone());
            Arc::new(MemoCache::new(
                config.clone(),
                move |resource: String| {
                    let source = factory_source.clone();
                    async move { Ok(load_image(source, resource).await) }
                },
                move |resource: String, _image| {
                    let source = token_source.clone();
                    async move { texture_token(source.as_ref(), &resource).await }
                },
            ))
        };

        let gfx_maps = {
            let (factory_source, token_source) = (source.clone(), source.clone());
            Arc::new(MemoCache::new(
                config.clone(),
                move |resource: String| {
                    let source = factory_source.clone();
                    async move { Ok(load_gfx_map(source, resource).await) }
                },
                move |resource: String, _map| {
                    let source = token_source.clone();
                    async move { source.token(&resource).await }
                },
            ))
        };

        let sprites = {
            let (images, factory_maps, token_maps) = (images.clone(), gfx_maps.clone(), gfx_maps.clone());
            Arc::new(MemoCache::new(
                config,
                move |key: String| {
                    let (images, gfx_maps) = (images.clone(), factory_maps.clone());
                    async move { sprite_by_key(&images, &gfx_maps, &key).await }
                },
                move |key: String, sprite| {
                    let (source, gfx_maps) = (source.clone(), token_maps.clone());
                    async move {
                        let (gfx, name) = split_key(&key);
                        let gfx_token = source.token(gfx).await;

                        // A sprite whose texture is missing still watches it
                        let texture = match sprite.await {
                            Ok(Some(sprite)) => Some(sprite.texture),
                            _ => match gfx_maps.get(gfx.to_string()).await {
                                Ok(map) => map.get(name).map(|t| t.texturefile.clone()),
                                Err(_) => None,
                            },
                        };

                        match texture {
                            Some(texture) => {
                                ExpiryToken::compose([&gfx_token, &texture_token(source.as_ref(), &texture).await])
                            }
                            None => gfx_token,
                        }
                    }
                },
            ))
        };

        Self {
            images,
            gfx_maps,
            sprites,
        }
    }

    pub async fn image(&self, resource: &str) -> Result<Option<Image>> {
        self.images.get(resource.to_string()).await
    }

    pub async fn gfx_map(&self, gfx_file: &str) -> Result<GfxMap> {
        self.gfx_maps.get(gfx_file.to_string()).await
    }

    /// First sprite called `name` in the given gfx files, in order
    pub async fn sprite(&self, name: &str, gfx_files: &[String]) -> Result<Option<Sprite>> {
        for gfx in gfx_files {
            if let Some(sprite) = self.sprites.get(sprite_key(gfx, name)).await? {
                return Ok(Some(sprite));
            }
        }
        Ok(None)
    }

    /// Look up several sprites concurrently
    pub async fn sprites(&self, names: &[String], gfx_files: &[String]) -> Result<Vec<Option<Sprite>>> {
        join_all(names.iter().map(|name| self.sprite(name, gfx_files)))
            .await
            .into_iter()
            .collect()
    }

    pub async fn stats(&self) -> [(&'static str, CacheStats); 3] {
        [
            ("images", self.images.stats().await),
            ("gfx_maps", self.gfx_maps.stats().await),
            ("sprites", self.sprites.stats().await),
        ]
    }

    /// Drop every expired or failed entry
    pub async fn cleanup(&self) -> usize {
        let events = [
            self.images.cleanup_expired().await,
            self.gfx_maps.cleanup_expired().await,
            self.sprites.cleanup_expired().await,
        ];
        events.iter().flatten().map(|e| e.keys.len()).sum()
    }
}

pub fn sprite_key(gfx_file: &str, name: &str) -> String {
    format!("{}?{}", gfx_file, name)
}

fn split_key(key: &str) -> (&str, &str) {
    key.split_once('?').unwrap_or((key, ""))
}

async fn sprite_by_key(
    images: &MemoCache<String, Option<Image>>,
    gfx_maps: &MemoCache<String, GfxMap>,
    key: &str,
) -> Result<Option<Sprite>> {
    let (gfx, name) = split_key(key);
    let map = gfx_maps.get(gfx.to_string()).await?;

    let Some(sprite_type) = map.get(name) else {
        return Ok(None);
    };
    let Some(image) = images.get(sprite_type.texturefile.clone()).await? else {
        warn!("Sprite {} in {} has no usable texture {}", name, gfx, sprite_type.texturefile);
        return Ok(None);
    };

    Ok(Some(Sprite {
        name: name.to_string(),
        texture: sprite_type.texturefile.clone(),
        image,
        frames: sprite_type.frames,
        bordersize: sprite_type.bordersize,
    }))
}
