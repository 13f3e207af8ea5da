// Dashboard sessions - per-client filters, selection and map pipeline
use crate::application::energy_api::EnergyApi;
use crate::application::geo_pipeline::{GeoArgs, GeoPipeline, GeoSnapshot, GeoState, LoadOutcome, PendingLoad};
use crate::application::request_sequence::RequestSequence;
use crate::application::scenario_service::{ScenarioService, ScenarioView};
use crate::domain::choropleth::Palette;
use crate::domain::filters::{FilterChange, MapFilters};
use crate::domain::territory::SelectedTerritory;
use crate::error::AtlasError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Year and scenario the session's map is loaded with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDefaults {
    pub year: i32,
    pub scenario: String,
}

impl Default for MapDefaults {
    fn default() -> Self {
        Self {
            year: 2019,
            scenario: "0".to_string(),
        }
    }
}

/// Scenario metrics for the selected territory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioPanel {
    pub scenario: Option<String>,
    pub year: Option<i32>,
    pub loading: bool,
    pub data: Option<ScenarioView>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub defaults: MapDefaults,
    pub filters: MapFilters,
    pub selection: Option<SelectedTerritory>,
    pub map: GeoSnapshot,
    pub scenario: ScenarioPanel,
}

pub struct DashboardSession {
    id: u64,
    created_at: DateTime<Utc>,
    defaults: MapDefaults,
    filters: watch::Sender<MapFilters>,
    selection: watch::Sender<Option<SelectedTerritory>>,
    scenario: watch::Sender<ScenarioPanel>,
    pipeline: Arc<GeoPipeline>,
    scenarios: ScenarioService,
    scenario_sequence: RequestSequence,
}

impl DashboardSession {
    pub fn new(
        id: u64,
        api: Arc<dyn EnergyApi>,
        palette: Palette,
        defaults: MapDefaults,
        filters: MapFilters,
    ) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            defaults,
            filters: watch::channel(filters).0,
            selection: watch::channel(None).0,
            scenario: watch::channel(ScenarioPanel::default()).0,
            pipeline: Arc::new(GeoPipeline::new(api.clone(), palette)),
            scenarios: ScenarioService::new(api),
            scenario_sequence: RequestSequence::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn filters(&self) -> MapFilters {
        self.filters.borrow().clone()
    }

    pub fn selection(&self) -> Option<SelectedTerritory> {
        self.selection.borrow().clone()
    }

    pub fn scenario_panel(&self) -> ScenarioPanel {
        self.scenario.borrow().clone()
    }

    pub fn pipeline(&self) -> &GeoPipeline {
        &self.pipeline
    }

    pub fn subscribe_map(&self) -> watch::Receiver<GeoState> {
        self.pipeline.subscribe()
    }

    pub fn snapshot(&self, with_geometry: bool) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            created_at: self.created_at,
            defaults: self.defaults.clone(),
            filters: self.filters(),
            selection: self.selection(),
            map: self.pipeline.snapshot(with_geometry),
            scenario: self.scenario_panel(),
        }
    }

    fn start_load(&self, filters: &MapFilters) -> Option<PendingLoad> {
        let args = GeoArgs::from_filters(filters, self.defaults.year, &self.defaults.scenario);
        self.pipeline.start(args)
    }

    fn spawn_load(&self, pending: Option<PendingLoad>) -> JoinHandle<LoadOutcome> {
        let pipeline = self.pipeline.clone();
        let id = self.id;
        tokio::spawn(async move {
            let outcome = match pending {
                Some(pending) => pipeline.run(pending).await,
                None => LoadOutcome::Skipped,
            };
            tracing::debug!("Session {} map reload: {:?}", id, outcome);
            outcome
        })
    }

    /// Re-runs the map pipeline in the background with the current filters.
    /// The ticket is taken before spawning, so a later reload always
    /// supersedes this one.
    pub fn reload(&self) -> JoinHandle<LoadOutcome> {
        let pending = self.start_load(&self.filters.borrow());
        self.spawn_load(pending)
    }

    /// Swaps the filters and issues the reload under the same lock, so the
    /// latest filters and the latest ticket always agree.
    pub fn set_filters(&self, filters: MapFilters) -> JoinHandle<LoadOutcome> {
        let mut pending = None;
        self.filters.send_modify(|current| {
            *current = filters;
            pending = self.start_load(current);
        });
        self.spawn_load(pending)
    }

    /// Applies one filter edit. The map reloads only when the edit changes
    /// what it loads; overlay edits never do.
    pub fn update_filters(&self, change: FilterChange) -> Option<JoinHandle<LoadOutcome>> {
        let mut pending = None;
        self.filters.send_if_modified(|current| {
            let before = current.clone();
            current.apply(change);
            if *current == before {
                return false;
            }
            let year = self.defaults.year;
            let scenario = &self.defaults.scenario;
            if GeoArgs::from_filters(current, year, scenario) != GeoArgs::from_filters(&before, year, scenario) {
                pending = Some(self.start_load(current));
            }
            true
        });
        pending.map(|pending| self.spawn_load(pending))
    }

    /// Stores the selection. In auto scale mode the map follows the
    /// selection's level; returns the reload when that happened.
    pub fn set_selection(&self, selection: Option<SelectedTerritory>) -> Option<JoinHandle<LoadOutcome>> {
        self.selection.send_replace(selection.clone());

        let Some(selection) = selection else {
            self.scenario_sequence.cancel();
            self.scenario.send_replace(ScenarioPanel::default());
            return None;
        };

        let mut pending = None;
        self.filters.send_if_modified(|filters| {
            if !filters.sync_scale_to(&selection) {
                return false;
            }
            pending = Some(self.start_load(filters));
            true
        });
        pending.map(|pending| self.spawn_load(pending))
    }

    /// Loads scenario metrics for the selected territory. Superseded loads
    /// leave the panel alone.
    pub fn load_scenario(self: &Arc<Self>, scenario: String, year: i32) -> JoinHandle<()> {
        let session = self.clone();
        let ticket = self.scenario_sequence.begin();

        tokio::spawn(async move {
            let target = session.selection().and_then(|s| s.code().map(|code| (s.level, code)));
            let Some((level, code)) = target else {
                if ticket.is_current() {
                    session.scenario.send_replace(ScenarioPanel::default());
                }
                return;
            };

            let started = session.scenario.send_if_modified(|panel| {
                if !ticket.is_current() {
                    return false;
                }
                *panel = ScenarioPanel {
                    scenario: Some(scenario.clone()),
                    year: Some(year),
                    loading: true,
                    ..Default::default()
                };
                true
            });
            if !started {
                return;
            }

            let outcome = ticket
                .run(session.scenarios.territory(level, code, &scenario, year))
                .await;
            if matches!(outcome, Err(AtlasError::Superseded)) {
                return;
            }

            session.scenario.send_if_modified(|panel| {
                if !ticket.is_current() {
                    return false;
                }
                panel.loading = false;
                match outcome {
                    Ok(view) => panel.data = Some(view),
                    Err(e) => {
                        tracing::warn!("Session {} scenario {} failed: {}", session.id, scenario, e);
                        panel.error = Some(e.to_string());
                    }
                }
                true
            });
        })
    }

    pub fn close(&self) {
        self.pipeline.cancel();
        self.scenario_sequence.cancel();
    }
}

/// Live sessions keyed by numeric id.
#[derive(Clone)]
pub struct SessionRegistry {
    api: Arc<dyn EnergyApi>,
    palette: Palette,
    defaults: MapDefaults,
    next_id: Arc<AtomicU64>,
    sessions: Arc<RwLock<HashMap<u64, Arc<DashboardSession>>>>,
}

impl SessionRegistry {
    pub fn new(api: Arc<dyn EnergyApi>, palette: Palette, defaults: MapDefaults) -> Self {
        Self {
            api,
            palette,
            defaults,
            next_id: Arc::new(AtomicU64::new(1)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a session and starts its first map load.
    pub fn create(&self, filters: Option<MapFilters>, defaults: Option<MapDefaults>) -> Arc<DashboardSession> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(DashboardSession::new(
            id,
            self.api.clone(),
            self.palette.clone(),
            defaults.unwrap_or_else(|| self.defaults.clone()),
            filters.unwrap_or_default(),
        ));
        session.reload();

        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, session.clone());
        tracing::info!("Created dashboard session {}", id);
        session
    }

    pub fn get(&self, id: u64) -> Option<Arc<DashboardSession>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).get(&id).cloned()
    }

    pub fn remove(&self, id: u64) -> bool {
        let removed = self.sessions.write().unwrap_or_else(|e| e.into_inner()).remove(&id);
        match removed {
            Some(session) => {
                session.close();
                tracing::info!("Removed dashboard session {}", id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::geo_pipeline::tests::stub;
    use crate::application::geo_pipeline::GeoPhase;
    use crate::domain::filters::{ConstraintOverlay, DataTheme, ScaleMode};
    use crate::domain::scenario::tests::sample_response;
    use crate::domain::territory::{Level, TerritoryCodes};
    use std::time::Duration;

    fn registry() -> SessionRegistry {
        let mut api = stub();
        api.scenarios.insert("4".into(), sample_response("4"));
        api.geo_delay.insert(Level::Province, Duration::from_millis(100));
        SessionRegistry::new(Arc::new(api), Palette::default(), MapDefaults::default())
    }

    fn torino_region() -> SelectedTerritory {
        SelectedTerritory {
            level: Level::Region,
            name: "Piemonte".into(),
            codes: TerritoryCodes { reg: 1, prov: None, mun: None },
            parent: None,
        }
    }

    #[tokio::test]
    async fn test_registry_create_get_remove() {
        let registry = registry();
        let a = registry.create(None, None);
        let b = registry.create(None, None);
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
        assert!(registry.get(a.id()).is_some());
        assert!(registry.remove(a.id()));
        assert!(!registry.remove(a.id()));
        assert!(registry.get(a.id()).is_none());
    }

    #[tokio::test]
    async fn test_selection_rescales_and_supersedes_initial_load() {
        let registry = registry();
        // Initial load targets the slow province level
        let session = registry.create(None, None);

        let reload = session.set_selection(Some(torino_region())).expect("auto mode rescales");
        assert_eq!(reload.await.unwrap(), LoadOutcome::Committed(GeoPhase::Ready));
        assert_eq!(session.filters().scale, Level::Region);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let snap = session.snapshot(false);
        assert_eq!(snap.map.level, Some(Level::Region));
        assert_eq!(snap.map.debug.values_mapped, 2);
        assert!(snap.map.geo.is_none());
    }

    #[tokio::test]
    async fn test_manual_mode_keeps_scale() {
        let registry = registry();
        let mut filters = MapFilters::default();
        filters.set_scale_mode(ScaleMode::Manual);
        let session = registry.create(Some(filters), None);

        assert!(session.set_selection(Some(torino_region())).is_none());
        assert_eq!(session.filters().scale, Level::Province);
    }

    #[tokio::test]
    async fn test_set_filters_reloads() {
        let registry = registry();
        let session = registry.create(None, None);
        let mut filters = session.filters();
        filters.set_scale(Level::Region);

        let outcome = session.set_filters(filters).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Committed(GeoPhase::Ready));
        assert_eq!(session.pipeline().state().level, Some(Level::Region));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_back_to_back_filters_commit_the_newest() {
        let registry = registry();
        for _ in 0..20 {
            let session = registry.create(None, None);
            let worker = session.clone();
            let (older, newer) = tokio::spawn(async move {
                let mut region = worker.filters();
                region.set_scale(Level::Region);
                let mut province = worker.filters();
                province.set_scale(Level::Province);
                (worker.set_filters(region), worker.set_filters(province))
            })
            .await
            .unwrap();

            assert_eq!(older.await.unwrap(), LoadOutcome::Superseded);
            assert_eq!(newer.await.unwrap(), LoadOutcome::Committed(GeoPhase::Ready));
            let state = session.pipeline().state();
            assert_eq!(state.level, Some(Level::Province));
            assert_eq!(state.phase, GeoPhase::Ready);
            assert_eq!(session.filters().scale, Level::Province);
        }
    }

    #[tokio::test]
    async fn test_filter_edits_reload_only_when_the_map_changes() {
        let registry = registry();
        let session = registry.create(None, None);

        let overlay = FilterChange::ToggleOverlay { overlay: ConstraintOverlay::Heritage };
        assert!(session.update_filters(overlay).is_none());
        assert_eq!(session.filters().overlays, vec![ConstraintOverlay::Heritage]);

        let same_scale = FilterChange::SetScale { scale: Level::Province };
        assert!(session.update_filters(same_scale).is_none());

        let theme = FilterChange::SetTheme { theme: DataTheme::Production };
        let reload = session.update_filters(theme).expect("theme changes the values query");
        assert_eq!(reload.await.unwrap(), LoadOutcome::Committed(GeoPhase::Ready));
        assert!(session.pipeline().state().values_request.unwrap().contains("domain=production"));

        let reload = session.update_filters(FilterChange::Reset).expect("reset restores the consumption theme");
        reload.await.unwrap();
        assert_eq!(session.filters(), MapFilters::default());
    }

    #[tokio::test]
    async fn test_scenario_panel_follows_selection() {
        let registry = registry();
        let session = registry.create(None, None);

        session.load_scenario("4".into(), 2030).await.unwrap();
        assert!(session.scenario_panel().data.is_none());

        session.set_selection(Some(torino_region()));
        session.load_scenario("4".into(), 2030).await.unwrap();
        let panel = session.scenario_panel();
        assert!(!panel.loading);
        assert_eq!(panel.data.unwrap().metrics.indexes.len(), 2);

        session.load_scenario("7".into(), 2030).await.unwrap();
        let panel = session.scenario_panel();
        assert!(panel.data.is_none());
        assert!(panel.error.unwrap().contains("404"));

        session.set_selection(None);
        assert!(session.scenario_panel().scenario.is_none());
    }
}
