//! GUI layout files and the `.gfx` sprite files they draw from

use crate::document::{parse_yaml, Point};
use async_trait::async_trait;
use modpreview_loader::loader::dependencies_of_kind;
use modpreview_loader::{
    Analysis, AnalysisInput, ContentAnalyzer, FileLoader, LoaderSession, ProgressRelay, ResourceSource, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub name: String,
    pub sprite: String,
    #[serde(default)]
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerWindow {
    pub name: String,
    #[serde(default)]
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContainerWindow>,
}

impl ContainerWindow {
    /// This container and every nested one, depth first
    pub fn walk(&self) -> Vec<&ContainerWindow> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuiFile {
    #[serde(default)]
    pub containers: Vec<ContainerWindow>,
}

impl GuiFile {
    pub fn find_container(&self, name: &str) -> Option<&ContainerWindow> {
        self.containers
            .iter()
            .flat_map(|c| c.walk())
            .find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuiFileEntry {
    pub file: String,
    pub data: GuiFile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuiFileLoaderResult {
    pub gui_files: Vec<GuiFileEntry>,
    pub gfx_files: Vec<String>,
}

pub struct GuiAnalyzer;

#[async_trait]
impl ContentAnalyzer for GuiAnalyzer {
    type Output = GuiFileLoaderResult;

    fn name(&self) -> &'static str {
        "GuiFileLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<GuiFileLoaderResult>> {
        let content = input.require_content()?;
        let data: GuiFile = parse_yaml(input.path, content)?;
        let gfx_files: Vec<String> = dependencies_of_kind(input.dependencies, "gfx")
            .map(str::to_string)
            .collect();

        Ok(Analysis::new(GuiFileLoaderResult {
            gui_files: vec![GuiFileEntry {
                file: input.path.to_string(),
                data,
            }],
            gfx_files: gfx_files.clone(),
        })
        .with_dependencies(gfx_files))
    }
}

pub type GuiFileLoader = FileLoader<GuiAnalyzer>;

pub fn gui_file_loader(path: &str, source: Arc<dyn ResourceSource>, progress: ProgressRelay) -> GuiFileLoader {
    FileLoader::new(path, GuiAnalyzer, source, progress)
}
