//! Strategic resource definitions

use crate::document::parse_yaml;
use async_trait::async_trait;
use modpreview_loader::{
    Analysis, AnalysisInput, ContentAnalyzer, FileLoader, LoaderSession, ProgressRelay, ResourceSource, Result,
    Warning,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::RESOURCES_FILE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub icon_frame: u32,
    #[serde(default)]
    pub civilian_factory_cost: f64,
}

#[derive(Debug, Deserialize)]
struct ResourcesFile {
    #[serde(default)]
    resources: Vec<Resource>,
}

pub struct ResourcesAnalyzer;

#[async_trait]
impl ContentAnalyzer for ResourcesAnalyzer {
    type Output = Vec<Resource>;

    fn name(&self) -> &'static str {
        "ResourceDefinitionLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<Vec<Resource>>> {
        let file: ResourcesFile = parse_yaml(input.path, input.require_content()?)?;

        let mut seen = HashSet::new();
        let mut warnings = Vec::new();
        let resources: Vec<Resource> = file
            .resources
            .into_iter()
            .filter(|r| {
                let fresh = seen.insert(r.name.clone());
                if !fresh {
                    warnings.push(Warning::new(input.path, format!("Duplicate resource {}", r.name)));
                }
                fresh
            })
            .collect();

        Ok(Analysis::new(resources).with_warnings(warnings))
    }
}

pub type ResourcesLoader = FileLoader<ResourcesAnalyzer>;

pub fn resources_loader(source: Arc<dyn ResourceSource>, progress: ProgressRelay) -> ResourcesLoader {
    FileLoader::new(RESOURCES_FILE, ResourcesAnalyzer, source, progress)
}
