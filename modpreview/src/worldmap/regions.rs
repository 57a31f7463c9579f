//! Strategic regions (groups of provinces) and supply areas (groups of states)

use crate::document::parse_yaml;
use async_trait::async_trait;
use modpreview_loader::{
    Analysis, AnalysisInput, ContentAnalyzer, FileLoader, Loader, LoaderSession, ProgressRelay, ResourceSource,
    Result, Warning,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::provinces::ProvinceMapLoader;
use super::states::StatesLoader;
use super::{retain_known, STRATEGIC_REGIONS_FILE, SUPPLY_AREAS_FILE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicRegion {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naval_terrain: Option<String>,
    #[serde(default)]
    pub provinces: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategicRegionMap {
    pub strategic_regions: Vec<StrategicRegion>,
    pub bad_strategic_regions_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyArea {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: u32,
    #[serde(default)]
    pub states: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyAreaMap {
    pub supply_areas: Vec<SupplyArea>,
    pub bad_supply_areas_count: usize,
}

#[derive(Debug, Deserialize)]
struct StrategicRegionsFile {
    #[serde(default)]
    strategic_regions: Vec<StrategicRegion>,
}

#[derive(Debug, Deserialize)]
struct SupplyAreasFile {
    #[serde(default)]
    supply_areas: Vec<SupplyArea>,
}

pub fn validate_strategic_regions(
    resource: &str,
    regions: Vec<StrategicRegion>,
    provinces: &HashSet<u32>,
) -> (StrategicRegionMap, Vec<Warning>) {
    let mut map = StrategicRegionMap::default();
    let mut warnings = Vec::new();

    for mut region in regions {
        let label = format!("Strategic region {}", region.id);
        let (kept, bad) = retain_known(resource, &label, "province", &region.provinces, provinces, &mut warnings);
        if bad {
            map.bad_strategic_regions_count += 1;
        }
        region.provinces = kept;
        map.strategic_regions.push(region);
    }

    (map, warnings)
}

pub fn validate_supply_areas(
    resource: &str,
    areas: Vec<SupplyArea>,
    states: &HashSet<u32>,
) -> (SupplyAreaMap, Vec<Warning>) {
    let mut map = SupplyAreaMap::default();
    let mut warnings = Vec::new();

    for mut area in areas {
        let label = format!("Supply area {}", area.id);
        let (kept, bad) = retain_known(resource, &label, "state", &area.states, states, &mut warnings);
        if bad {
            map.bad_supply_areas_count += 1;
        }
        area.states = kept;
        map.supply_areas.push(area);
    }

    (map, warnings)
}

pub struct StrategicRegionsAnalyzer {
    provinces: Arc<ProvinceMapLoader>,
}

#[async_trait]
impl ContentAnalyzer for StrategicRegionsAnalyzer {
    type Output = StrategicRegionMap;

    fn name(&self) -> &'static str {
        "StrategicRegionsLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, session: &LoaderSession) -> Result<Analysis<StrategicRegionMap>> {
        let file: StrategicRegionsFile = parse_yaml(input.path, input.require_content()?)?;

        let provinces = self.provinces.load(session).await?;
        session.throw_if_cancelled()?;

        let (map, warnings) = validate_strategic_regions(input.path, file.strategic_regions, &provinces.value.ids());
        Ok(Analysis::new(map)
            .with_dependencies(provinces.dependencies.iter().cloned())
            .with_warnings(warnings))
    }
}

pub struct SupplyAreasAnalyzer {
    states: Arc<StatesLoader>,
}

#[async_trait]
impl ContentAnalyzer for SupplyAreasAnalyzer {
    type Output = SupplyAreaMap;

    fn name(&self) -> &'static str {
        "SupplyAreasLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, session: &LoaderSession) -> Result<Analysis<SupplyAreaMap>> {
        let file: SupplyAreasFile = parse_yaml(input.path, input.require_content()?)?;

        let states = self.states.load(session).await?;
        session.throw_if_cancelled()?;

        let (map, warnings) = validate_supply_areas(input.path, file.supply_areas, &states.value.ids());
        Ok(Analysis::new(map)
            .with_dependencies(states.dependencies.iter().cloned())
            .with_warnings(warnings))
    }
}

pub type StrategicRegionsLoader = FileLoader<StrategicRegionsAnalyzer>;
pub type SupplyAreasLoader = FileLoader<SupplyAreasAnalyzer>;

pub fn strategic_regions_loader(
    provinces: Arc<ProvinceMapLoader>,
    source: Arc<dyn ResourceSource>,
    progress: ProgressRelay,
) -> StrategicRegionsLoader {
    FileLoader::new(STRATEGIC_REGIONS_FILE, StrategicRegionsAnalyzer { provinces }, source, progress)
}

pub fn supply_areas_loader(
    states: Arc<StatesLoader>,
    source: Arc<dyn ResourceSource>,
    progress: ProgressRelay,
) -> SupplyAreasLoader {
    FileLoader::new(SUPPLY_AREAS_FILE, SupplyAreasAnalyzer { states }, source, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_supply_areas() {
        let states: HashSet<u32> = [1, 2].into_iter().collect();
        let areas = vec![
            SupplyArea {
                id: 1,
                name: "SUPPLYAREA_1".to_string(),
                value: 10,
                states: vec![1, 2],
            },
            SupplyArea {
                id: 2,
                name: "SUPPLYAREA_2".to_string(),
                value: 5,
                states: vec![3],
            },
        ];

        let (map, warnings) = validate_supply_areas(SUPPLY_AREAS_FILE, areas, &states);
        assert_eq!(map.bad_supply_areas_count, 1);
        assert!(map.supply_areas[1].states.is_empty());
        assert_eq!(warnings, vec![Warning::new(SUPPLY_AREAS_FILE, "Supply area 2 refers to unknown state 3")]);
    }
}
