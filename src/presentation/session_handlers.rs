// Dashboard session endpoints
use crate::application::session::{DashboardSession, MapDefaults};
use crate::domain::filters::{FilterChange, MapFilters};
use crate::domain::territory::{Level, SelectedTerritory};
use crate::error::{AtlasError, Result};
use crate::infrastructure::chunked_stream::chunked_json_stream;
use crate::infrastructure::http_response::accepts_brotli;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::respond;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;

fn session(state: &AppState, id: u64) -> Result<Arc<DashboardSession>> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| AtlasError::NotFound(format!("Session {} not found", id)))
}

fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AtlasError::invalid(format!("Invalid request body: {}", e)))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSession {
    pub filters: Option<MapFilters>,
    pub year: Option<i32>,
    pub scenario: Option<String>,
}

/// Body may be empty; missing fields use the configured defaults.
pub async fn create_session(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response> {
    let request: CreateSession = parse_body(&body)?;
    let defaults = MapDefaults {
        year: request.year.unwrap_or(state.defaults.year),
        scenario: request.scenario.unwrap_or_else(|| state.defaults.scenario.clone()),
    };

    let session = state.sessions.create(request.filters, Some(defaults));
    Ok((StatusCode::CREATED, Json(session.snapshot(false))).into_response())
}

#[derive(Deserialize)]
pub struct SnapshotQuery {
    pub geometry: Option<bool>,
}

pub async fn get_session(
    Path(id): Path<u64>,
    Query(query): Query<SnapshotQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let session = session(&state, id)?;
    let snapshot = session.snapshot(query.geometry.unwrap_or(false));
    Ok(respond(&snapshot, &headers).await)
}

pub async fn delete_session(Path(id): Path<u64>, State(state): State<Arc<AppState>>) -> Result<StatusCode> {
    if state.sessions.remove(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AtlasError::NotFound(format!("Session {} not found", id)))
    }
}

/// Replaces the filters and reloads the map in the background.
pub async fn put_filters(
    Path(id): Path<u64>,
    State(state): State<Arc<AppState>>,
    Json(filters): Json<MapFilters>,
) -> Result<Response> {
    let session = session(&state, id)?;
    session.set_filters(filters);
    Ok((StatusCode::ACCEPTED, Json(session.filters())).into_response())
}

/// Applies one filter edit; the map reloads when the edit affects it.
pub async fn patch_filters(
    Path(id): Path<u64>,
    State(state): State<Arc<AppState>>,
    Json(change): Json<FilterChange>,
) -> Result<Response> {
    let session = session(&state, id)?;
    session.update_filters(change);
    Ok((StatusCode::ACCEPTED, Json(session.filters())).into_response())
}

/// Either a full selection, a level + code looked up in the territory
/// index, or an empty body to clear.
#[derive(Debug, Default, Deserialize)]
pub struct SelectionRequest {
    pub selection: Option<SelectedTerritory>,
    pub level: Option<Level>,
    pub code: Option<i64>,
}

pub async fn put_selection(
    Path(id): Path<u64>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response> {
    let session = session(&state, id)?;
    let request: SelectionRequest = parse_body(&body)?;

    let selection = match request {
        SelectionRequest { selection: Some(selection), .. } => Some(selection),
        SelectionRequest { level: Some(level), code: Some(code), .. } => {
            let row = state
                .territories
                .find(level, code)
                .ok_or_else(|| AtlasError::NotFound(format!("No {} with code {}", level, code)))?;
            Some(row.to_selection())
        }
        SelectionRequest { level: None, code: None, .. } => None,
        _ => return Err(AtlasError::invalid("Selection needs both level and code")),
    };

    session.set_selection(selection);
    Ok((StatusCode::ACCEPTED, Json(session.snapshot(false))).into_response())
}

#[derive(Deserialize)]
pub struct ScenarioRequest {
    pub scenario: String,
    pub year: Option<i32>,
}

/// Starts loading scenario metrics for the current selection.
pub async fn put_scenario(
    Path(id): Path<u64>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScenarioRequest>,
) -> Result<StatusCode> {
    let session = session(&state, id)?;
    if session.selection().is_none() {
        return Err(AtlasError::invalid("No territory selected"));
    }
    let year = request.year.unwrap_or(state.defaults.year);
    session.load_scenario(request.scenario, year);
    Ok(StatusCode::ACCEPTED)
}

pub async fn get_session_map(
    Path(id): Path<u64>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let session = session(&state, id)?;
    let snapshot = session.pipeline().snapshot(true);
    Ok(respond(&snapshot, &headers).await)
}

/// Streams a geometry-free snapshot every time the session's map state changes.
pub async fn session_map_stream(
    Path(id): Path<u64>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response> {
    let session = session(&state, id)?;
    let palette = session.pipeline().palette().clone();
    let updates = WatchStream::new(session.subscribe_map()).map(move |map| map.snapshot(&palette, false));

    Ok(match chunked_json_stream(updates, accepts_brotli(&headers)) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    })
}
