// HTTP request handlers
use crate::application::geo_pipeline::GeoArgs;
use crate::domain::filters::{DayType, Domain, Resolution};
use crate::domain::import::{preview_csv, ImportContext};
use crate::domain::scenario::{MetricItem, ScenarioComparison};
use crate::domain::series::{Sector, Source};
use crate::domain::territory::{format_meta, Level, TerritoryIndexRow};
use crate::error::{AtlasError, Result};
use crate::infrastructure::chunked_stream::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const MAX_SEARCH_LIMIT: usize = 50;

/// JSON body, Brotli'd when the client asks for it.
pub(crate) async fn respond<T: Serialize>(data: &T, headers: &HeaderMap) -> Response {
    match json_response(data, accepts_brotli(headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| AtlasError::invalid(format!("Missing {}", name)))
}

fn parse_level(raw: Option<&str>) -> Result<Level> {
    let raw = required(raw, "level")?;
    Level::parse(raw).ok_or_else(|| AtlasError::invalid(format!("Invalid level: {}", raw)))
}

fn parse_domain(raw: Option<&str>, default: Domain) -> Result<Domain> {
    match raw {
        None | Some("") => Ok(default),
        Some(raw) => Domain::parse(raw).ok_or_else(|| AtlasError::invalid(format!("Invalid domain: {}", raw))),
    }
}

fn parse_resolution(raw: Option<&str>, default: Resolution) -> Result<Resolution> {
    match raw {
        None | Some("") => Ok(default),
        Some(raw) => {
            Resolution::parse(raw).ok_or_else(|| AtlasError::invalid(format!("Invalid resolution: {}", raw)))
        }
    }
}

fn parse_day_type(raw: Option<&str>) -> Result<Option<DayType>> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => DayType::parse(raw)
            .map(Some)
            .ok_or_else(|| AtlasError::invalid(format!("Invalid day_type: {}", raw))),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct TerritoryHit<'a> {
    #[serde(flatten)]
    pub row: &'a TerritoryIndexRow,
    pub meta: String,
}

pub async fn search_territories(
    Query(query): Query<SearchQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let limit = query.limit.unwrap_or(state.search_limit).min(MAX_SEARCH_LIMIT);
    let hits: Vec<TerritoryHit> = state
        .territories
        .search(query.q.as_deref().unwrap_or_default(), limit)
        .into_iter()
        .map(|row| TerritoryHit { meta: format_meta(row), row })
        .collect();
    respond(&hits, &headers).await
}

#[derive(Deserialize)]
pub struct ChoroplethQuery {
    pub level: Option<String>,
    pub domain: Option<String>,
    pub resolution: Option<String>,
    pub year: Option<i32>,
    pub scenario: Option<String>,
    pub base_group: Option<String>,
}

impl ChoroplethQuery {
    fn into_args(self, state: &AppState) -> Result<GeoArgs> {
        Ok(GeoArgs {
            level: required(self.level, "level")?,
            domain: parse_domain(self.domain.as_deref(), Domain::Consumption)?,
            resolution: parse_resolution(self.resolution.as_deref(), Resolution::Annual)?,
            year: self.year.unwrap_or(state.defaults.year),
            scenario: self.scenario.unwrap_or_else(|| state.defaults.scenario.clone()),
            base_group: self.base_group.filter(|g| !g.is_empty()),
        })
    }
}

pub async fn choropleth(
    Query(query): Query<ChoroplethQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let args = query.into_args(&state)?;
    let map = state.choropleth_service.build(&args).await?;
    Ok(respond(&map, &headers).await)
}

/// Progressive choropleth: geometry chunk, values chunk, completion chunk
pub async fn choropleth_stream(
    Query(query): Query<ChoroplethQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let args = query.into_args(&state)?;
    let rx = state.choropleth_service.stream(args)?;
    Ok(stream_from_receiver(rx, accepts_brotli(&headers)))
}

#[derive(Deserialize)]
pub struct MonthlyQuery {
    pub level: Option<String>,
    pub code: Option<i64>,
    pub year: Option<i32>,
    pub scenario: Option<String>,
}

pub async fn monthly_chart(
    Query(query): Query<MonthlyQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let level = parse_level(query.level.as_deref())?;
    let year = query.year.unwrap_or(state.defaults.year);
    let scenario = query.scenario.unwrap_or_else(|| state.defaults.scenario.clone());

    let rows = state.chart_service.monthly(level, query.code, year, &scenario).await?;
    Ok(respond(&rows, &headers).await)
}

#[derive(Deserialize)]
pub struct DailyQuery {
    pub province_code: Option<i64>,
    pub year: Option<i32>,
    pub domain: Option<String>,
}

pub async fn daily_chart(
    Query(query): Query<DailyQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let domain = parse_domain(query.domain.as_deref(), Domain::Consumption)?;
    let year = query.year.unwrap_or(state.defaults.year);

    let profile = state.chart_service.daily(query.province_code, year, domain).await?;
    let rows = profile.map(|p| p.chart_rows()).unwrap_or_default();
    Ok(respond(&rows, &headers).await)
}

#[derive(Deserialize)]
pub struct HourlyQuery {
    pub level: Option<String>,
    pub code: Option<i64>,
    pub year: Option<i32>,
    pub scenario: Option<String>,
    pub domain: Option<String>,
    pub day_type: Option<String>,
}

pub async fn hourly_chart(
    Query(query): Query<HourlyQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let level = parse_level(query.level.as_deref())?;
    let domain = parse_domain(query.domain.as_deref(), Domain::Consumption)?;
    let day_type = parse_day_type(query.day_type.as_deref())?;
    let year = query.year.unwrap_or(state.defaults.year);
    let scenario = query.scenario.unwrap_or_else(|| state.defaults.scenario.clone());

    let points = state
        .chart_service
        .hourly(level, query.code, year, &scenario, domain, day_type)
        .await?;
    Ok(respond(&points, &headers).await)
}

pub async fn province_consumption(
    Path((code, sector)): Path<(i64, String)>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let sector = Sector::parse(&sector).ok_or_else(|| AtlasError::invalid(format!("Invalid sector: {}", sector)))?;
    let data = state.api.province_monthly_consumption(sector, code).await?;
    Ok(respond(&data, &headers).await)
}

pub async fn province_production(
    Path(code): Path<i64>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let data = state.api.province_production(code).await?;
    Ok(respond(&data, &headers).await)
}

#[derive(Deserialize)]
pub struct ScenarioQuery {
    pub level: Option<String>,
    pub code: Option<i64>,
    pub scenario: Option<String>,
    pub year: Option<i32>,
}

pub async fn scenario_territory(
    Query(query): Query<ScenarioQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let level = parse_level(query.level.as_deref())?;
    let code = required(query.code, "code")?;
    let scenario = required(query.scenario, "scenario")?;
    let year = query.year.unwrap_or(state.defaults.year);

    let view = state.scenario_service.territory(level, code, &scenario, year).await?;
    Ok(respond(&view, &headers).await)
}

#[derive(Deserialize)]
pub struct CompareQuery {
    pub level: Option<String>,
    pub code: Option<i64>,
    pub year: Option<i32>,
    pub scenarios: Option<String>,
}

#[derive(Serialize)]
struct ComparisonBody<'a> {
    #[serde(flatten)]
    comparison: &'a ScenarioComparison,
    index_cards: BTreeMap<String, Vec<MetricItem>>,
}

pub async fn scenario_compare(
    Query(query): Query<CompareQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let level = parse_level(query.level.as_deref())?;
    let code = required(query.code, "code")?;
    let year = query.year.unwrap_or(state.defaults.year);
    let scenarios: Vec<String> = required(query.scenarios, "scenarios")?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if scenarios.is_empty() {
        return Err(AtlasError::invalid("Missing scenarios"));
    }

    let comparison = state.scenario_service.compare(level, code, year, &scenarios).await;
    let body = ComparisonBody {
        index_cards: comparison.index_cards(),
        comparison: &comparison,
    };
    Ok(respond(&body, &headers).await)
}

#[derive(Deserialize)]
pub struct ImportQuery {
    pub level: Option<String>,
    pub domain: Option<String>,
    pub resolution: Option<String>,
    pub year: Option<i32>,
    pub source: Option<String>,
}

/// Validates an uploaded CSV without loading it anywhere.
pub async fn import_preview(
    Query(query): Query<ImportQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response> {
    let source = match query.source.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(Source::parse(raw).ok_or_else(|| AtlasError::invalid(format!("Invalid source: {}", raw)))?),
    };
    let context = ImportContext {
        level: parse_level(query.level.as_deref())?,
        domain: parse_domain(query.domain.as_deref(), Domain::Production)?,
        source,
        resolution: parse_resolution(query.resolution.as_deref(), Resolution::Monthly)?,
        year: query.year.unwrap_or(state.defaults.year),
    };

    let preview = preview_csv(body.as_ref(), context)?;
    if preview.is_clean() {
        tracing::info!("Import preview: {} rows, all ok", preview.rows.len());
    } else {
        tracing::warn!(
            "Import preview: {} rows, {} missing, {} outliers, {} invalid",
            preview.rows.len(),
            preview.counts.missing,
            preview.counts.outlier,
            preview.counts.invalid
        );
    }
    Ok(respond(&preview, &headers).await)
}
