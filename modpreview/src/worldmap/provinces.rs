//! Province definitions: `id;r;g;b;type;coastal;terrain;continent`

use async_trait::async_trait;
use modpreview_loader::{
    Analysis, AnalysisInput, ContentAnalyzer, FileLoader, LoaderSession, Position, ProgressRelay, ResourceSource,
    Result, Warning,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::PROVINCE_DEFINITION_FILE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Province {
    pub id: u32,
    pub color: [u8; 3],
    /// `land`, `sea` or `lake`
    pub kind: String,
    pub coastal: bool,
    pub terrain: String,
    pub continent: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvinceMap {
    pub provinces: Vec<Province>,
    pub bad_provinces_count: usize,
}

impl ProvinceMap {
    pub fn ids(&self) -> HashSet<u32> {
        self.provinces.iter().map(|p| p.id).collect()
    }
}

fn parse_line(line: &str) -> std::result::Result<Province, String> {
    let fields: Vec<&str> = line.split(';').map(str::trim).collect();
    if fields.len() < 8 {
        return Err(format!("expected 8 fields, found {}", fields.len()));
    }

    let number = |i: usize, name: &str| -> std::result::Result<u32, String> {
        fields[i]
            .parse::<u32>()
            .map_err(|_| format!("invalid {}: {:?}", name, fields[i]))
    };
    let channel = |i: usize| -> std::result::Result<u8, String> {
        fields[i]
            .parse::<u8>()
            .map_err(|_| format!("invalid color channel: {:?}", fields[i]))
    };

    Ok(Province {
        id: number(0, "id")?,
        color: [channel(1)?, channel(2)?, channel(3)?],
        kind: fields[4].to_string(),
        coastal: fields[5].eq_ignore_ascii_case("true"),
        terrain: fields[6].to_string(),
        continent: number(7, "continent")?,
    })
}

/// Parse the definition file. Province 0 is the unused placeholder row.
pub fn parse_definitions(resource: &str, text: &str) -> (ProvinceMap, Vec<Warning>) {
    let mut map = ProvinceMap::default();
    let mut warnings = Vec::new();
    let mut by_color: HashMap<[u8; 3], u32> = HashMap::new();
    let mut seen = HashSet::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let position = Position {
            line: index as u32 + 1,
            column: 1,
        };

        let province = match parse_line(line) {
            Ok(p) => p,
            Err(message) => {
                map.bad_provinces_count += 1;
                warnings.push(Warning::new(resource, message).at(position));
                continue;
            }
        };

        if province.id == 0 {
            continue;
        }
        if !seen.insert(province.id) {
            map.bad_provinces_count += 1;
            warnings.push(Warning::new(resource, format!("Duplicate province {}", province.id)).at(position));
            continue;
        }
        if let Some(other) = by_color.insert(province.color, province.id) {
            warnings.push(
                Warning::new(
                    resource,
                    format!("Provinces {} and {} share color {:?}", other, province.id, province.color),
                )
                .at(position),
            );
        }

        map.provinces.push(province);
    }

    (map, warnings)
}

pub struct ProvinceMapAnalyzer;

#[async_trait]
impl ContentAnalyzer for ProvinceMapAnalyzer {
    type Output = ProvinceMap;

    fn name(&self) -> &'static str {
        "ProvinceMapLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<ProvinceMap>> {
        let (map, warnings) = parse_definitions(input.path, input.require_content()?);
        Ok(Analysis::new(map).with_warnings(warnings))
    }
}

pub type ProvinceMapLoader = FileLoader<ProvinceMapAnalyzer>;

pub fn province_map_loader(source: Arc<dyn ResourceSource>, progress: ProgressRelay) -> ProvinceMapLoader {
    FileLoader::new(PROVINCE_DEFINITION_FILE, ProvinceMapAnalyzer, source, progress)
}
