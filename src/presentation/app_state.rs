// Application state for HTTP handlers
use crate::application::chart_service::ChartService;
use crate::application::choropleth_service::ChoroplethService;
use crate::application::energy_api::EnergyApi;
use crate::application::scenario_service::ScenarioService;
use crate::application::session::{MapDefaults, SessionRegistry};
use crate::domain::choropleth::Palette;
use crate::domain::territory::TerritoryIndex;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn EnergyApi>,
    pub choropleth_service: ChoroplethService,
    pub chart_service: ChartService,
    pub scenario_service: ScenarioService,
    pub sessions: SessionRegistry,
    pub territories: Arc<TerritoryIndex>,
    pub defaults: MapDefaults,
    pub search_limit: usize,
}

impl AppState {
    pub fn new(
        api: Arc<dyn EnergyApi>,
        territories: TerritoryIndex,
        palette: Palette,
        defaults: MapDefaults,
        search_limit: usize,
    ) -> Self {
        Self {
            choropleth_service: ChoroplethService::new(api.clone(), palette.clone()),
            chart_service: ChartService::new(api.clone()),
            scenario_service: ScenarioService::new(api.clone()),
            sessions: SessionRegistry::new(api.clone(), palette, defaults.clone()),
            territories: Arc::new(territories),
            defaults,
            search_limit,
            api,
        }
    }
}
