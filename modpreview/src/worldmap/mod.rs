//! # World map
//!
//! A composite preview built from one sub-loader per map layer:
//!
//! - provinces (`map/definition.csv`), the primary layer every other layer
//!   is validated against
//! - states, strategic regions, supply areas, railways and supply nodes,
//!   each loading the province map (or the states) themselves
//! - countries, which may be missing without failing the preview
//! - resource definitions
//!
//! [`WorldMapLoader`] combines them into one [`WorldMap`].

pub mod countries;
pub mod loader;
pub mod provinces;
pub mod railways;
pub mod regions;
pub mod resources;
pub mod states;

pub use countries::{countries_loader, CountriesLoader, Country};
pub use loader::{WorldMap, WorldMapLoader};
pub use provinces::{province_map_loader, Province, ProvinceMap, ProvinceMapLoader};
pub use railways::{railway_loader, supply_node_loader, Railway, RailwayLoader, RailwayMap, SupplyNode, SupplyNodeLoader, SupplyNodeMap};
pub use regions::{
    strategic_regions_loader, supply_areas_loader, StrategicRegion, StrategicRegionMap, StrategicRegionsLoader,
    SupplyArea, SupplyAreaMap, SupplyAreasLoader,
};
pub use resources::{resources_loader, Resource, ResourcesLoader};
pub use states::{states_loader, State, StateMap, StatesLoader};

use modpreview_loader::Warning;
use std::collections::HashSet;

pub const PROVINCE_DEFINITION_FILE: &str = "map/definition.csv";
pub const STATES_FILE: &str = "map/states.yml";
pub const COUNTRY_TAGS_FILE: &str = "common/country_tags/00_countries.txt";
pub const STRATEGIC_REGIONS_FILE: &str = "map/strategicregions.yml";
pub const SUPPLY_AREAS_FILE: &str = "map/supplyareas.yml";
pub const RAILWAYS_FILE: &str = "map/railways.txt";
pub const SUPPLY_NODES_FILE: &str = "map/supply_nodes.txt";
pub const RESOURCES_FILE: &str = "common/resources/00_resources.yml";

/// Keep the ids found in `known`, warning about each one that is not.
/// Returns the kept ids and whether anything was dropped.
pub(crate) fn retain_known(
    resource: &str,
    owner: &str,
    kind: &str,
    ids: &[u32],
    known: &HashSet<u32>,
    warnings: &mut Vec<Warning>,
) -> (Vec<u32>, bool) {
    let mut dropped = false;
    let kept = ids
        .iter()
        .copied()
        .filter(|id| {
            let ok = known.contains(id);
            if !ok {
                dropped = true;
                warnings.push(Warning::new(resource, format!("{} refers to unknown {} {}", owner, kind, id)));
            }
            ok
        })
        .collect();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retain_known() {
        let known: HashSet<u32> = [1, 2, 3].into_iter().collect();
        let mut warnings = Vec::new();

        let (kept, dropped) = retain_known(STATES_FILE, "State 7", "province", &[1, 9, 3], &known, &mut warnings);
        assert_eq!(kept, vec![1, 3]);
        assert!(dropped);
        assert_eq!(warnings, vec![Warning::new(STATES_FILE, "State 7 refers to unknown province 9")]);

        let (_, dropped) = retain_known(STATES_FILE, "State 8", "province", &[2], &known, &mut warnings);
        assert!(!dropped);
        assert_eq!(warnings.len(), 1);
    }
}
