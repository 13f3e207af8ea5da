// Route table
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    choropleth, choropleth_stream, daily_chart, health_check, hourly_chart, import_preview, monthly_chart,
    province_consumption, province_production, scenario_compare, scenario_territory, search_territories,
};
use crate::presentation::session_handlers::{
    create_session, delete_session, get_session, get_session_map, patch_filters, put_filters, put_scenario,
    put_selection, session_map_stream,
};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/territories/search", get(search_territories))
        .route("/choropleth", get(choropleth))
        .route("/choropleth/stream", get(choropleth_stream))
        .route("/charts/monthly", get(monthly_chart))
        .route("/charts/daily", get(daily_chart))
        .route("/charts/hourly", get(hourly_chart))
        .route("/provinces/:code/consumption/:sector", get(province_consumption))
        .route("/provinces/:code/production", get(province_production))
        .route("/scenarios/territory", get(scenario_territory))
        .route("/scenarios/compare", get(scenario_compare))
        .route("/import/preview", post(import_preview))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/filters", put(put_filters).patch(patch_filters))
        .route("/sessions/:id/selection", put(put_selection))
        .route("/sessions/:id/scenario", put(put_scenario))
        .route("/sessions/:id/map", get(get_session_map))
        .route("/sessions/:id/map/stream", get(session_map_stream))
        .with_state(state)
}
