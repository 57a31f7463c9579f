//! Technology tree previews
//!
//! A technology file lists technologies placed in one or more folders. The
//! preview groups them by folder, then splits each folder into trees of
//! technologies connected by `leads_to` paths, and loads the GUI layout the
//! trees are drawn into.

use crate::document::{parse_yaml, Point};
use crate::gui::{GuiFileEntry, GuiFileLoader};
use async_trait::async_trait;
use modpreview_loader::loader::dependencies_of_kind;
use modpreview_loader::{
    merge_dependencies, merge_warnings, Analysis, AnalysisInput, Bundle, ContentAnalyzer, FileLoader, LoaderRegistry,
    LoaderSession, ProgressRelay, ResourceSource, Result, Warning,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub const TECHNOLOGY_GUI_FILES: [&str; 2] = [
    "interface/countrytechtreeview.gui",
    "interface/countrydoctrinetreeview.gui",
];

pub const TECHNOLOGY_GFX_FILES: [&str; 3] = [
    "interface/countrytechtreeview.gfx",
    "interface/countrytechnologyview.gfx",
    "interface/technologies.gfx",
];

#[derive(Debug, Clone, Deserialize)]
struct TechnologyFile {
    #[serde(default)]
    technologies: Vec<TechnologyDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct TechnologyDef {
    id: String,
    #[serde(default)]
    start_year: i32,
    #[serde(default)]
    folders: Vec<FolderDef>,
    #[serde(default)]
    leads_to: Vec<String>,
    #[serde(default)]
    xor: Vec<String>,
    #[serde(default)]
    sub_technologies: Vec<String>,
    #[serde(default)]
    enable_equipments: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FolderDef {
    name: String,
    #[serde(default)]
    position: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyFolder {
    pub name: String,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    pub id: String,
    pub folders: BTreeMap<String, TechnologyFolder>,
    pub leads_to: Vec<String>,
    pub xor: Vec<String>,
    pub start_year: i32,
    pub enable_equipments: bool,
    pub sub_technologies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyTree {
    pub start_technology: String,
    pub folder: String,
    pub technologies: Vec<Technology>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnologyTreeLoaderResult {
    pub technology_trees: Vec<TechnologyTree>,
    pub gui_files: Vec<GuiFileEntry>,
    pub gfx_files: Vec<String>,
}

/// Technologies of one file, validated; unknown references become warnings
fn build_technologies(resource: &str, file: TechnologyFile) -> (Vec<Technology>, Vec<Warning>) {
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();
    let mut defs = Vec::with_capacity(file.technologies.len());

    for def in file.technologies {
        if !seen.insert(def.id.clone()) {
            warnings.push(Warning::new(resource, format!("Duplicate technology {}", def.id)));
            continue;
        }
        defs.push(def);
    }

    let technologies = defs
        .into_iter()
        .map(|def| {
            for reference in def.leads_to.iter().chain(&def.sub_technologies) {
                if !seen.contains(reference) {
                    warnings.push(Warning::new(
                        resource,
                        format!("Technology {} refers to unknown technology {}", def.id, reference),
                    ));
                }
            }

            let folders = def
                .folders
                .into_iter()
                .filter(|f| !f.name.is_empty())
                .map(|f| {
                    let folder = TechnologyFolder {
                        name: f.name.clone(),
                        x: f.position.x,
                        y: f.position.y,
                    };
                    (f.name, folder)
                })
                .collect();

            Technology {
                id: def.id,
                folders,
                leads_to: def.leads_to,
                xor: def.xor,
                start_year: def.start_year,
                enable_equipments: !def.enable_equipments.is_empty(),
                sub_technologies: def.sub_technologies.into_iter().filter(|s| seen.contains(s)).collect(),
            }
        })
        .collect();

    (technologies, warnings)
}

fn find(parent: &mut [usize], i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    let mut node = i;
    while parent[node] != root {
        let next = parent[node];
        parent[node] = root;
        node = next;
    }
    root
}

/// Group by folder, then split each folder into connected trees.
///
/// A tree starts at its first technology without an incoming path inside
/// the folder. Trees and their technologies keep declaration order.
pub fn technology_trees(technologies: &[Technology]) -> Vec<TechnologyTree> {
    let mut by_folder: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, tech) in technologies.iter().enumerate() {
        for folder in tech.folders.keys() {
            by_folder.entry(folder.as_str()).or_default().push(i);
        }
    }

    let mut trees = Vec::new();
    for (folder, members) in by_folder {
        let slot: HashMap<&str, usize> = members
            .iter()
            .enumerate()
            .map(|(slot, &i)| (technologies[i].id.as_str(), slot))
            .collect();

        let mut parent: Vec<usize> = (0..members.len()).collect();
        let mut has_incoming = vec![false; members.len()];
        for (from, &i) in members.iter().enumerate() {
            for child in &technologies[i].leads_to {
                if let Some(&to) = slot.get(child.as_str()) {
                    has_incoming[to] = true;
                    let (a, b) = (find(&mut parent, from), find(&mut parent, to));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for s in 0..members.len() {
            let root = find(&mut parent, s);
            components.entry(root).or_default().push(s);
        }

        for slots in components.into_values() {
            let start = slots
                .iter()
                .copied()
                .find(|&s| !has_incoming[s])
                .unwrap_or(slots[0]);

            trees.push(TechnologyTree {
                start_technology: technologies[members[start]].id.clone(),
                folder: folder.to_string(),
                technologies: slots.iter().map(|&s| technologies[members[s]].clone()).collect(),
            });
        }
    }

    trees
}

fn unique<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

/// Reads a technology file and the GUI files it is drawn into
pub struct TechnologyTreeAnalyzer {
    gui_loaders: Arc<LoaderRegistry<GuiFileLoader>>,
}

impl TechnologyTreeAnalyzer {
    pub fn new(gui_loaders: Arc<LoaderRegistry<GuiFileLoader>>) -> Self {
        Self { gui_loaders }
    }
}

#[async_trait]
impl ContentAnalyzer for TechnologyTreeAnalyzer {
    type Output = TechnologyTreeLoaderResult;

    fn name(&self) -> &'static str {
        "TechnologyTreeLoader"
    }

    async fn analyze(
        &self,
        input: AnalysisInput<'_>,
        session: &LoaderSession,
    ) -> Result<Analysis<TechnologyTreeLoaderResult>> {
        let content = input.require_content()?;
        let file: TechnologyFile = parse_yaml(input.path, content)?;
        let (technologies, mut warnings) = build_technologies(input.path, file);
        let technology_trees = technology_trees(&technologies);

        let gfx_dependencies: Vec<String> = TECHNOLOGY_GFX_FILES
            .iter()
            .copied()
            .chain(dependencies_of_kind(input.dependencies, "gfx"))
            .map(str::to_string)
            .collect();
        let gui_dependencies: Vec<String> = TECHNOLOGY_GUI_FILES
            .iter()
            .copied()
            .chain(dependencies_of_kind(input.dependencies, "gui"))
            .map(str::to_string)
            .collect();

        let gui_results = self.gui_loaders.load_multiple(gui_dependencies.as_slice(), session).await?;
        session.throw_if_cancelled()?;

        let gfx_files = unique(
            gfx_dependencies
                .iter()
                .cloned()
                .chain(gui_results.iter().flat_map(|r| r.value.gfx_files.iter().cloned())),
        );

        let mut seen_gui = HashSet::new();
        let gui_files: Vec<GuiFileEntry> = gui_results
            .iter()
            .flat_map(|r| r.value.gui_files.iter())
            .filter(|entry| seen_gui.insert(entry.file.clone()))
            .cloned()
            .collect();

        let bundles: Vec<&dyn Bundle> = gui_results.iter().map(|r| &**r as &dyn Bundle).collect();
        warnings.extend(merge_warnings(&bundles));

        debug!(
            "{}: {} trees, {} gui files, {} gfx files",
            input.path,
            technology_trees.len(),
            gui_files.len(),
            gfx_files.len()
        );

        Ok(Analysis::new(TechnologyTreeLoaderResult {
            technology_trees,
            gui_files,
            gfx_files,
        })
        .with_dependencies(gfx_dependencies)
        .with_dependencies(gui_dependencies)
        .with_dependencies(merge_dependencies(&bundles))
        .with_warnings(warnings))
    }
}

pub type TechnologyTreeLoader = FileLoader<TechnologyTreeAnalyzer>;

pub fn technology_tree_loader(
    path: &str,
    gui_loaders: Arc<LoaderRegistry<GuiFileLoader>>,
    source: Arc<dyn ResourceSource>,
    progress: ProgressRelay,
) -> TechnologyTreeLoader {
    FileLoader::new(path, TechnologyTreeAnalyzer::new(gui_loaders), source, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tech(id: &str, folder: &str, leads_to: &[&str]) -> Technology {
        Technology {
            id: id.to_string(),
            folders: BTreeMap::from([(
                folder.to_string(),
                TechnologyFolder {
                    name: folder.to_string(),
                    x: 0,
                    y: 0,
                },
            )]),
            leads_to: leads_to.iter().map(|s| s.to_string()).collect(),
            xor: Vec::new(),
            start_year: 1936,
            enable_equipments: false,
            sub_technologies: Vec::new(),
        }
    }

    #[test]
    fn test_trees_split_by_connection() {
        let technologies = vec![
            tech("infantry_weapons1", "infantry_folder", &["infantry_weapons2"]),
            tech("infantry_weapons", "infantry_folder", &["infantry_weapons1"]),
            tech("infantry_weapons2", "infantry_folder", &[]),
            tech("support_weapons", "infantry_folder", &[]),
            tech("gw_artillery", "artillery_folder", &[]),
        ];

        let trees = technology_trees(&technologies);
        let summary: Vec<(String, String, usize)> = trees
            .iter()
            .map(|t| (t.folder.clone(), t.start_technology.clone(), t.technologies.len()))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("artillery_folder".to_string(), "gw_artillery".to_string(), 1),
                ("infantry_folder".to_string(), "infantry_weapons".to_string(), 3),
                ("infantry_folder".to_string(), "support_weapons".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_paths_across_folders_do_not_join_trees() {
        let technologies = vec![
            tech("a", "left", &["b"]),
            tech("b", "right", &[]),
        ];

        let trees = technology_trees(&technologies);
        assert_eq!(trees.len(), 2);
        assert!(trees.iter().all(|t| t.technologies.len() == 1));
    }

    #[test]
    fn test_unknown_references_warn() {
        let file: TechnologyFile = parse_yaml(
            "common/technologies/infantry.txt",
            "technologies:\n  - id: a\n    leads_to: [ghost]\n    sub_technologies: [phantom]\n  - id: a\n",
        )
        .unwrap();

        let (technologies, warnings) = build_technologies("common/technologies/infantry.txt", file);
        assert_eq!(technologies.len(), 1);
        assert!(technologies[0].sub_technologies.is_empty());
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.message.contains("Duplicate technology a")));
    }
}
