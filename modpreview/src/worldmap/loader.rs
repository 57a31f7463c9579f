//! The world map composite loader

use async_trait::async_trait;
use modpreview_loader::{
    merge_dependencies, merge_warnings, or_degraded, Bundle, LoadResult, Loader, LoaderCell, LoaderSession,
    ProgressRelay, ResourceSource, Result, Warning,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::countries::{countries_loader, CountriesLoader, Country};
use super::provinces::{province_map_loader, Province, ProvinceMapLoader};
use super::railways::{railway_loader, supply_node_loader, Railway, RailwayLoader, SupplyNode, SupplyNodeLoader};
use super::regions::{
    strategic_regions_loader, supply_areas_loader, StrategicRegion, StrategicRegionsLoader, SupplyArea,
    SupplyAreasLoader,
};
use super::resources::{resources_loader, Resource, ResourcesLoader};
use super::states::{states_loader, State, StatesLoader};
use super::COUNTRY_TAGS_FILE;

/// Everything a world map preview draws
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldMap {
    pub provinces: Vec<Province>,
    pub states: Vec<State>,
    pub countries: Vec<Country>,
    pub strategic_regions: Vec<StrategicRegion>,
    pub supply_areas: Vec<SupplyArea>,
    pub railways: Vec<Railway>,
    pub supply_nodes: Vec<SupplyNode>,
    pub resources: Vec<Resource>,

    pub provinces_count: usize,
    pub states_count: usize,
    pub countries_count: usize,
    pub strategic_regions_count: usize,
    pub supply_areas_count: usize,
    pub railways_count: usize,
    pub supply_nodes_count: usize,

    pub bad_provinces_count: usize,
    pub bad_states_count: usize,
    pub bad_strategic_regions_count: usize,
    pub bad_supply_areas_count: usize,

    pub warnings: Vec<Warning>,
}

/// Composite of every map layer.
///
/// Supply areas and railways with supply nodes are alternatives: only the
/// enabled side is loaded, the other contributes an empty bundle.
pub struct WorldMapLoader {
    cell: LoaderCell<WorldMap>,
    provinces: Arc<ProvinceMapLoader>,
    states: Arc<StatesLoader>,
    countries: Arc<CountriesLoader>,
    strategic_regions: Arc<StrategicRegionsLoader>,
    supply_areas: Arc<SupplyAreasLoader>,
    railways: Arc<RailwayLoader>,
    supply_nodes: Arc<SupplyNodeLoader>,
    resources: Arc<ResourcesLoader>,
    enable_supply_area: AtomicBool,
    reload_requested: AtomicBool,
}

impl WorldMapLoader {
    pub fn new(source: Arc<dyn ResourceSource>, progress: ProgressRelay, enable_supply_area: bool) -> Self {
        let layers = ProgressRelay::child_of(&progress);

        let provinces = Arc::new(province_map_loader(source.clone(), layers.clone()));
        let states = Arc::new(states_loader(provinces.clone(), source.clone(), layers.clone()));

        Self {
            countries: Arc::new(countries_loader(source.clone(), layers.clone())),
            strategic_regions: Arc::new(strategic_regions_loader(provinces.clone(), source.clone(), layers.clone())),
            supply_areas: Arc::new(supply_areas_loader(states.clone(), source.clone(), layers.clone())),
            railways: Arc::new(railway_loader(provinces.clone(), source.clone(), layers.clone())),
            supply_nodes: Arc::new(supply_node_loader(provinces.clone(), source.clone(), layers.clone())),
            resources: Arc::new(resources_loader(source.clone(), layers)),
            cell: LoaderCell::new("[WorldMapLoader]", source, progress),
            provinces,
            states,
            enable_supply_area: AtomicBool::new(enable_supply_area),
            reload_requested: AtomicBool::new(false),
        }
    }

    /// Load in a fresh session
    pub async fn get_world_map(&self, force: bool) -> Result<WorldMap> {
        self.get_value(force).await
    }

    /// Recompute the composite on its next load; sub-loaders are still
    /// reused if their dependencies did not change
    pub fn shallow_force_reload(&self) {
        self.reload_requested.store(true, Ordering::SeqCst);
    }

    pub fn supply_area_enabled(&self) -> bool {
        self.enable_supply_area.load(Ordering::SeqCst)
    }

    pub fn set_supply_area_enabled(&self, enable: bool) {
        if self.enable_supply_area.swap(enable, Ordering::SeqCst) != enable {
            info!("Supply areas {}", if enable { "enabled" } else { "disabled" });
            self.shallow_force_reload();
        }
    }
}

#[async_trait]
impl Loader for WorldMapLoader {
    type Output = WorldMap;

    fn cell(&self) -> &LoaderCell<WorldMap> {
        &self.cell
    }

    async fn should_reload(&self, _session: &LoaderSession) -> bool {
        self.reload_requested.load(Ordering::SeqCst)
    }

    async fn load_impl(&self, session: &LoaderSession) -> Result<LoadResult<WorldMap>> {
        let pending = PendingReload::take(&self.reload_requested);
        let result = self.merge_layers(session).await;
        if result.is_ok() && !session.is_cancelled() && !session.is_tainted() {
            pending.settle();
        }
        result
    }
}

/// A taken reload request, handed back to the flag unless settled
struct PendingReload<'a> {
    flag: &'a AtomicBool,
    requested: bool,
}

impl<'a> PendingReload<'a> {
    fn take(flag: &'a AtomicBool) -> Self {
        Self {
            requested: flag.swap(false, Ordering::SeqCst),
            flag,
        }
    }

    fn settle(mut self) {
        self.requested = false;
    }
}

impl Drop for PendingReload<'_> {
    fn drop(&mut self) {
        if self.requested {
            debug!("World map reload request kept for the next load");
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

impl WorldMapLoader {
    async fn merge_layers(&self, session: &LoaderSession) -> Result<LoadResult<WorldMap>> {
        let provinces = self.provinces.load(session).await?;
        session.throw_if_cancelled()?;

        let states = self.states.load(session).await?;
        session.throw_if_cancelled()?;

        let countries = or_degraded(self.countries.load(session).await, COUNTRY_TAGS_FILE)?;
        session.throw_if_cancelled()?;

        let strategic_regions = self.strategic_regions.load(session).await?;
        session.throw_if_cancelled()?;

        let enable_supply_area = self.supply_area_enabled();
        let supply_areas = if enable_supply_area {
            self.supply_areas.load(session).await?
        } else {
            Arc::new(LoadResult::empty())
        };
        session.throw_if_cancelled()?;

        let railways = if enable_supply_area {
            Arc::new(LoadResult::empty())
        } else {
            self.railways.load(session).await?
        };
        session.throw_if_cancelled()?;

        let supply_nodes = if enable_supply_area {
            Arc::new(LoadResult::empty())
        } else {
            self.supply_nodes.load(session).await?
        };
        session.throw_if_cancelled()?;

        let resources = self.resources.load(session).await?;
        session.throw_if_cancelled()?;

        debug!("Loader session {}: {:?}", session.id(), session.visited_loaders());

        let bundles: [&dyn Bundle; 8] = [
            &*provinces,
            &*states,
            &*countries,
            &*strategic_regions,
            &*supply_areas,
            &*railways,
            &*supply_nodes,
            &*resources,
        ];
        let warnings = merge_warnings(&bundles);
        let dependencies = merge_dependencies(&bundles);
        debug!("World map dependencies: {:?}", dependencies);

        let world_map = WorldMap {
            provinces: provinces.value.provinces.clone(),
            states: states.value.states.clone(),
            countries: countries.value.clone(),
            strategic_regions: strategic_regions.value.strategic_regions.clone(),
            supply_areas: supply_areas.value.supply_areas.clone(),
            railways: railways.value.railways.clone(),
            supply_nodes: supply_nodes.value.supply_nodes.clone(),
            resources: resources.value.clone(),

            provinces_count: provinces.value.provinces.len(),
            states_count: states.value.states.len(),
            countries_count: countries.value.len(),
            strategic_regions_count: strategic_regions.value.strategic_regions.len(),
            supply_areas_count: supply_areas.value.supply_areas.len(),
            railways_count: railways.value.railways.len(),
            supply_nodes_count: supply_nodes.value.supply_nodes.len(),

            bad_provinces_count: provinces.value.bad_provinces_count,
            bad_states_count: states.value.bad_states_count,
            bad_strategic_regions_count: strategic_regions.value.bad_strategic_regions_count,
            bad_supply_areas_count: supply_areas.value.bad_supply_areas_count,

            warnings: warnings.clone(),
        };

        Ok(LoadResult::new(world_map)
            .with_dependencies(dependencies)
            .with_warnings(warnings))
    }
}
