//! Railways (`level count p1 .. pn`) and supply nodes (`level province`)

use async_trait::async_trait;
use modpreview_loader::{
    Analysis, AnalysisInput, ContentAnalyzer, FileLoader, Loader, LoaderSession, Position, ProgressRelay,
    ResourceSource, Result, Warning,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::provinces::ProvinceMapLoader;
use super::{RAILWAYS_FILE, SUPPLY_NODES_FILE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Railway {
    pub level: u32,
    pub provinces: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailwayMap {
    pub railways: Vec<Railway>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyNode {
    pub level: u32,
    pub province: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyNodeMap {
    pub supply_nodes: Vec<SupplyNode>,
}

/// Non-empty, non-comment lines split into numbers, with their position
fn numeric_lines(resource: &str, text: &str) -> (Vec<(Position, Vec<u32>)>, Vec<Warning>) {
    let mut lines = Vec::new();
    let mut warnings = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let position = Position {
            line: index as u32 + 1,
            column: 1,
        };
        match line.split_whitespace().map(str::parse::<u32>).collect::<std::result::Result<Vec<u32>, _>>() {
            Ok(numbers) => lines.push((position, numbers)),
            Err(_) => {
                warnings.push(Warning::new(resource, format!("Expected numbers, found {:?}", line)).at(position))
            }
        }
    }

    (lines, warnings)
}

pub fn parse_railways(resource: &str, text: &str, provinces: &HashSet<u32>) -> (RailwayMap, Vec<Warning>) {
    let (lines, mut warnings) = numeric_lines(resource, text);
    let mut railways = Vec::new();

    for (position, numbers) in lines {
        let [level, count, rest @ ..] = numbers.as_slice() else {
            warnings.push(Warning::new(resource, "Railway needs a level and a province count").at(position));
            continue;
        };
        if rest.len() != *count as usize || rest.len() < 2 {
            warnings.push(
                Warning::new(
                    resource,
                    format!("Railway declares {} provinces but lists {}", count, rest.len()),
                )
                .at(position),
            );
            continue;
        }
        if let Some(unknown) = rest.iter().find(|p| !provinces.contains(*p)) {
            warnings.push(Warning::new(resource, format!("Railway refers to unknown province {}", unknown)).at(position));
            continue;
        }

        railways.push(Railway {
            level: *level,
            provinces: rest.to_vec(),
        });
    }

    (RailwayMap { railways }, warnings)
}

pub fn parse_supply_nodes(resource: &str, text: &str, provinces: &HashSet<u32>) -> (SupplyNodeMap, Vec<Warning>) {
    let (lines, mut warnings) = numeric_lines(resource, text);
    let mut supply_nodes = Vec::new();

    for (position, numbers) in lines {
        let [level, province] = numbers.as_slice() else {
            warnings.push(Warning::new(resource, "Supply node needs a level and a province").at(position));
            continue;
        };
        if !provinces.contains(province) {
            warnings.push(Warning::new(resource, format!("Supply node in unknown province {}", province)).at(position));
            continue;
        }

        supply_nodes.push(SupplyNode {
            level: *level,
            province: *province,
        });
    }

    (SupplyNodeMap { supply_nodes }, warnings)
}

pub struct RailwayAnalyzer {
    provinces: Arc<ProvinceMapLoader>,
}

#[async_trait]
impl ContentAnalyzer for RailwayAnalyzer {
    type Output = RailwayMap;

    fn name(&self) -> &'static str {
        "RailwayLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, session: &LoaderSession) -> Result<Analysis<RailwayMap>> {
        let content = input.require_content()?;

        let provinces = self.provinces.load(session).await?;
        session.throw_if_cancelled()?;

        let (map, warnings) = parse_railways(input.path, content, &provinces.value.ids());
        Ok(Analysis::new(map)
            .with_dependencies(provinces.dependencies.iter().cloned())
            .with_warnings(warnings))
    }
}

pub struct SupplyNodeAnalyzer {
    provinces: Arc<ProvinceMapLoader>,
}

#[async_trait]
impl ContentAnalyzer for SupplyNodeAnalyzer {
    type Output = SupplyNodeMap;

    fn name(&self) -> &'static str {
        "SupplyNodeLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, session: &LoaderSession) -> Result<Analysis<SupplyNodeMap>> {
        let content = input.require_content()?;

        let provinces = self.provinces.load(session).await?;
        session.throw_if_cancelled()?;

        let (map, warnings) = parse_supply_nodes(input.path, content, &provinces.value.ids());
        Ok(Analysis::new(map)
            .with_dependencies(provinces.dependencies.iter().cloned())
            .with_warnings(warnings))
    }
}

pub type RailwayLoader = FileLoader<RailwayAnalyzer>;
pub type SupplyNodeLoader = FileLoader<SupplyNodeAnalyzer>;

pub fn railway_loader(
    provinces: Arc<ProvinceMapLoader>,
    source: Arc<dyn ResourceSource>,
    progress: ProgressRelay,
) -> RailwayLoader {
    FileLoader::new(RAILWAYS_FILE, RailwayAnalyzer { provinces }, source, progress)
}

pub fn supply_node_loader(
    provinces: Arc<ProvinceMapLoader>,
    source: Arc<dyn ResourceSource>,
    progress: ProgressRelay,
) -> SupplyNodeLoader {
    FileLoader::new(SUPPLY_NODES_FILE, SupplyNodeAnalyzer { provinces }, source, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provinces() -> HashSet<u32> {
        (1..=5).collect()
    }

    #[test]
    fn test_parse_railways() {
        let text = "1 3 1 2 3\n2 2 4 5 # double track\n1 3 1 2\n1 2 1 9\nx y\n";
        let (map, warnings) = parse_railways(RAILWAYS_FILE, text, &provinces());

        assert_eq!(
            map.railways,
            vec![
                Railway {
                    level: 1,
                    provinces: vec![1, 2, 3]
                },
                Railway {
                    level: 2,
                    provinces: vec![4, 5]
                },
            ]
        );
        let lines: Vec<u32> = warnings.iter().filter_map(|w| w.position).map(|p| p.line).collect();
        assert_eq!(lines, vec![5, 3, 4]);
    }

    #[test]
    fn test_parse_supply_nodes() {
        let text = "1 3\n1 42\n1\n";
        let (map, warnings) = parse_supply_nodes(SUPPLY_NODES_FILE, text, &provinces());

        assert_eq!(map.supply_nodes, vec![SupplyNode { level: 1, province: 3 }]);
        assert_eq!(warnings.len(), 2);
    }
}
