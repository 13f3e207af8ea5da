// Staged geometry + values loading for the map, guarded against stale responses
use crate::application::energy_api::{EnergyApi, ValuesQuery, ValuesRow};
use crate::application::request_sequence::{RequestSequence, RequestTicket};
use crate::domain::choropleth::{colorize, feature_code, legend, LegendEntry, Palette};
use crate::domain::filters::{Domain, MapFilters, Resolution};
use crate::domain::territory::Level;
use crate::error::AtlasError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

const DEBUG_SAMPLE: usize = 5;

/// Arguments of one map load. The level stays a raw string so an unknown
/// value can be rejected without touching loaded data.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoArgs {
    pub level: String,
    pub domain: Domain,
    pub resolution: Resolution,
    pub year: i32,
    pub scenario: String,
    pub base_group: Option<String>,
}

impl GeoArgs {
    pub fn from_filters(filters: &MapFilters, year: i32, scenario: &str) -> Self {
        Self {
            level: filters.scale.as_str().to_string(),
            domain: filters.theme.domain(),
            resolution: filters.time_resolution.backend(),
            year,
            scenario: scenario.to_string(),
            base_group: None,
        }
    }

    pub fn values_query(&self, level: Level) -> ValuesQuery {
        let query = ValuesQuery::new(level, self.resolution, self.year, self.domain, self.scenario.clone());
        match &self.base_group {
            Some(group) => query.with_base_group(group.clone()),
            None => query,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoPhase {
    #[default]
    Idle,
    GeoLoading,
    GeoReady,
    ValuesLoading,
    Ready,
    Error,
}

/// Territory code -> value, skipping rows whose code or value does not parse.
pub fn values_by_code(rows: &[ValuesRow], level: Level) -> HashMap<i64, f64> {
    rows.iter()
        .filter_map(|row| Some((row.code(level)?, row.value()?)))
        .collect()
}

fn request_line(path: &str, params: &[(&str, String)]) -> String {
    let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}?{}", path, query.join("&"))
}

#[derive(Debug, Clone, Default)]
pub struct GeoState {
    pub request_id: u64,
    pub phase: GeoPhase,
    pub level: Option<Level>,
    pub geo: Option<Arc<Value>>,
    pub values: Arc<HashMap<i64, f64>>,
    pub breaks: Vec<f64>,
    pub error: Option<String>,
    pub geo_request: Option<String>,
    pub values_request: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoDebug {
    pub geo_features: usize,
    pub values_mapped: usize,
    pub geo_sample_codes: Vec<Option<i64>>,
    pub values_sample: Vec<(i64, f64)>,
    pub geo_request: Option<String>,
    pub values_request: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeoSnapshot {
    pub request_id: u64,
    pub phase: GeoPhase,
    pub loading_geo: bool,
    pub loading_values: bool,
    pub error: Option<String>,
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<Value>,
    pub breaks: Vec<f64>,
    pub legend: Vec<LegendEntry>,
    pub debug: GeoDebug,
}

impl GeoState {
    fn features(&self) -> &[Value] {
        self.geo
            .as_deref()
            .and_then(|fc| fc.get("features"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn debug(&self) -> GeoDebug {
        let geo_sample_codes = match self.level {
            Some(level) => self
                .features()
                .iter()
                .take(DEBUG_SAMPLE)
                .map(|f| f.get("properties").and_then(Value::as_object).and_then(|p| feature_code(level, p)))
                .collect(),
            None => Vec::new(),
        };

        let mut values_sample: Vec<(i64, f64)> = self.values.iter().map(|(k, v)| (*k, *v)).collect();
        values_sample.sort_by_key(|(code, _)| *code);
        values_sample.truncate(DEBUG_SAMPLE);

        GeoDebug {
            geo_features: self.features().len(),
            values_mapped: self.values.len(),
            geo_sample_codes,
            values_sample,
            geo_request: self.geo_request.clone(),
            values_request: self.values_request.clone(),
        }
    }

    /// Coloured view of the state. Geometry is cloned only when asked for.
    pub fn snapshot(&self, palette: &Palette, with_geometry: bool) -> GeoSnapshot {
        let geo = match (with_geometry, self.geo.as_deref(), self.level) {
            (true, Some(fc), Some(level)) => {
                let mut fc = fc.clone();
                colorize(&mut fc, level, &self.values, &self.breaks, palette);
                Some(fc)
            }
            _ => None,
        };

        GeoSnapshot {
            request_id: self.request_id,
            phase: self.phase,
            loading_geo: self.phase == GeoPhase::GeoLoading,
            loading_values: self.phase == GeoPhase::ValuesLoading,
            error: self.error.clone(),
            level: self.level,
            geo,
            breaks: self.breaks.clone(),
            legend: legend(&self.breaks, &palette.colors),
            debug: self.debug(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Level was not recognised; nothing was fetched.
    Skipped,
    Committed(GeoPhase),
    Superseded,
}

/// A map load whose ticket is already issued.
#[derive(Debug)]
pub struct PendingLoad {
    ticket: RequestTicket,
    level: Level,
    simplify: f64,
    query: ValuesQuery,
}

pub struct GeoPipeline {
    api: Arc<dyn EnergyApi>,
    palette: Palette,
    sequence: RequestSequence,
    state: watch::Sender<GeoState>,
}

impl GeoPipeline {
    pub fn new(api: Arc<dyn EnergyApi>, palette: Palette) -> Self {
        let (state, _) = watch::channel(GeoState::default());
        Self {
            api,
            palette,
            sequence: RequestSequence::new(),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GeoState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> GeoState {
        self.state.borrow().clone()
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn snapshot(&self, with_geometry: bool) -> GeoSnapshot {
        self.state.borrow().snapshot(&self.palette, with_geometry)
    }

    /// Aborts whatever load is in flight.
    pub fn cancel(&self) {
        self.sequence.cancel();
    }

    /// Applies `update` only while `ticket` is the latest one.
    fn commit(&self, ticket: &RequestTicket, update: impl FnOnce(&mut GeoState)) -> bool {
        self.state.send_if_modified(|state| {
            if !ticket.is_current() {
                return false;
            }
            update(state);
            true
        })
    }

    fn fail(&self, ticket: &RequestTicket, stage: &str, err: AtlasError) -> LoadOutcome {
        if matches!(err, AtlasError::Superseded) {
            return LoadOutcome::Superseded;
        }
        tracing::error!("Map {} load #{} failed: {}", stage, ticket.id(), err);
        let message = err.to_string();
        if self.commit(ticket, |state| {
            state.phase = GeoPhase::Error;
            state.error = Some(message);
        }) {
            LoadOutcome::Committed(GeoPhase::Error)
        } else {
            LoadOutcome::Superseded
        }
    }

    /// Issues the load's ticket and publishes the loading state. Tickets
    /// follow call order, so whichever `start` ran last wins no matter in
    /// what order the returned loads are polled. `None` for an unknown level.
    pub fn start(&self, args: GeoArgs) -> Option<PendingLoad> {
        let Some(level) = Level::parse(&args.level) else {
            tracing::warn!("Skipping map load: invalid level {:?}", args.level);
            self.sequence.cancel();
            self.state.send_modify(|state| {
                state.phase = GeoPhase::Idle;
            });
            return None;
        };

        let ticket = self.sequence.begin();
        let simplify = level.default_simplify();
        let query = args.values_query(level);
        let geo_request = request_line(
            "/map/territories",
            &[("level", level.as_str().to_string()), ("simplify", simplify.to_string())],
        );
        let values_request = request_line("/charts/values", &query.params());

        tracing::debug!("Map load #{}: {} / {}", ticket.id(), geo_request, values_request);
        self.commit(&ticket, |state| {
            *state = GeoState {
                request_id: ticket.id(),
                phase: GeoPhase::GeoLoading,
                level: Some(level),
                geo_request: Some(geo_request),
                values_request: Some(values_request),
                ..Default::default()
            };
        });

        Some(PendingLoad {
            ticket,
            level,
            simplify,
            query,
        })
    }

    /// Fetches geometry, then values, committing each stage while the
    /// load's ticket is still the latest.
    pub async fn run(&self, load: PendingLoad) -> LoadOutcome {
        let PendingLoad {
            ticket,
            level,
            simplify,
            query,
        } = load;

        let geo = match ticket.run(self.api.territories(level, simplify)).await {
            Ok(geo) => geo,
            Err(e) => return self.fail(&ticket, "geometry", e),
        };
        if !self.commit(&ticket, |state| {
            state.geo = Some(Arc::new(geo));
            state.phase = GeoPhase::GeoReady;
        }) {
            return LoadOutcome::Superseded;
        }

        self.commit(&ticket, |state| state.phase = GeoPhase::ValuesLoading);
        let rows = match ticket.run(self.api.values(&query)).await {
            Ok(rows) => rows,
            Err(e) => return self.fail(&ticket, "values", e),
        };

        let values = values_by_code(&rows, level);
        let samples: Vec<f64> = values.values().copied().collect();
        let breaks = self.palette.breaks(&samples);
        let mapped = values.len();

        if !self.commit(&ticket, |state| {
            state.values = Arc::new(values);
            state.breaks = breaks;
            state.phase = GeoPhase::Ready;
        }) {
            return LoadOutcome::Superseded;
        }

        tracing::info!("Map load #{} ready: {} rows, {} mapped", ticket.id(), rows.len(), mapped);
        LoadOutcome::Committed(GeoPhase::Ready)
    }
}
