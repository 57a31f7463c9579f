//! States: named groups of provinces with an owner

use crate::document::parse_yaml;
use async_trait::async_trait;
use modpreview_loader::{
    Analysis, AnalysisInput, ContentAnalyzer, FileLoader, Loader, LoaderSession, ProgressRelay, ResourceSource,
    Result, Warning,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::provinces::ProvinceMapLoader;
use super::{retain_known, STATES_FILE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub manpower: u64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub provinces: Vec<u32>,
    #[serde(default)]
    pub resources: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMap {
    pub states: Vec<State>,
    pub bad_states_count: usize,
}

impl StateMap {
    pub fn ids(&self) -> HashSet<u32> {
        self.states.iter().map(|s| s.id).collect()
    }
}

#[derive(Debug, Deserialize)]
struct StatesFile {
    #[serde(default)]
    states: Vec<State>,
}

/// Drop unknown provinces and provinces already claimed by another state
pub fn validate_states(resource: &str, states: Vec<State>, provinces: &HashSet<u32>) -> (StateMap, Vec<Warning>) {
    let mut map = StateMap::default();
    let mut warnings = Vec::new();
    let mut owner_of: HashMap<u32, u32> = HashMap::new();
    let mut ids = HashSet::new();

    for mut state in states {
        if !ids.insert(state.id) {
            map.bad_states_count += 1;
            warnings.push(Warning::new(resource, format!("Duplicate state {}", state.id)));
            continue;
        }

        let label = format!("State {}", state.id);
        let (known, mut bad) = retain_known(resource, &label, "province", &state.provinces, provinces, &mut warnings);

        let mut kept = Vec::with_capacity(known.len());
        for province in known {
            match owner_of.get(&province) {
                Some(&other) => {
                    bad = true;
                    warnings.push(Warning::new(
                        resource,
                        format!("Province {} of state {} already belongs to state {}", province, state.id, other),
                    ));
                }
                None => {
                    owner_of.insert(province, state.id);
                    kept.push(province);
                }
            }
        }

        if kept.is_empty() {
            bad = true;
            warnings.push(Warning::new(resource, format!("State {} has no provinces", state.id)));
        }
        if bad {
            map.bad_states_count += 1;
        }

        state.provinces = kept;
        map.states.push(state);
    }

    (map, warnings)
}

pub struct StatesAnalyzer {
    provinces: Arc<ProvinceMapLoader>,
}

#[async_trait]
impl ContentAnalyzer for StatesAnalyzer {
    type Output = StateMap;

    fn name(&self) -> &'static str {
        "StatesLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, session: &LoaderSession) -> Result<Analysis<StateMap>> {
        let file: StatesFile = parse_yaml(input.path, input.require_content()?)?;

        let provinces = self.provinces.load(session).await?;
        session.throw_if_cancelled()?;

        let (map, warnings) = validate_states(input.path, file.states, &provinces.value.ids());
        Ok(Analysis::new(map)
            .with_dependencies(provinces.dependencies.iter().cloned())
            .with_warnings(warnings))
    }
}

pub type StatesLoader = FileLoader<StatesAnalyzer>;

pub fn states_loader(
    provinces: Arc<ProvinceMapLoader>,
    source: Arc<dyn ResourceSource>,
    progress: ProgressRelay,
) -> StatesLoader {
    FileLoader::new(STATES_FILE, StatesAnalyzer { provinces }, source, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: u32, provinces: &[u32]) -> State {
        State {
            id,
            name: format!("STATE_{}", id),
            owner: Some("FRA".to_string()),
            manpower: 0,
            category: "town".to_string(),
            provinces: provinces.to_vec(),
            resources: BTreeMap::new(),
        }
    }

    #[test]
    fn test_validate_states() {
        let provinces: HashSet<u32> = [1, 2, 3].into_iter().collect();
        let states = vec![state(1, &[1, 2]), state(2, &[2, 3, 7]), state(3, &[9]), state(1, &[3])];

        let (map, warnings) = validate_states(STATES_FILE, states, &provinces);

        assert_eq!(map.states.len(), 3);
        assert_eq!(map.states[1].provinces, vec![3]);
        assert!(map.states[2].provinces.is_empty());
        assert_eq!(map.bad_states_count, 3);
        // unknown 7, shared 2, unknown 9, empty state 3, duplicate state 1
        assert_eq!(warnings.len(), 5);
    }
}
