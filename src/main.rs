// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod error;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::session::MapDefaults;
use crate::domain::choropleth::Palette;
use crate::domain::territory::TerritoryIndex;
use crate::infrastructure::config::{load_config, ServerSettings};
use crate::infrastructure::http_api::HttpEnergyApi;
use crate::presentation::app_state::AppState;
use crate::presentation::routes::router;

fn cors_layer(server: &ServerSettings) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if server.cors_origins.is_empty() || server.cors_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("energy_atlas=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = load_config()?;

    let territories = match TerritoryIndex::load(Path::new(&config.territories.index_path)) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(
                "Territory index {} unavailable, search disabled: {}",
                config.territories.index_path,
                e
            );
            TerritoryIndex::default()
        }
    };
    tracing::info!("Loaded {} territories", territories.len());

    // Create upstream client (infrastructure layer)
    let api = Arc::new(HttpEnergyApi::new(
        &config.upstream.base_url,
        Duration::from_secs(config.upstream.timeout_secs),
    )?);

    // Create services (application layer)
    let defaults = MapDefaults {
        year: config.map.default_year,
        scenario: config.map.default_scenario.clone(),
    };
    let state = Arc::new(AppState::new(
        api,
        territories,
        Palette::new(config.map.palette.clone()),
        defaults,
        config.territories.search_limit,
    ));

    // Build router (presentation layer)
    // Compression is done in the response builders, so no CompressionLayer
    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server));

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!(
        "Starting energy-atlas service on {} (upstream {})",
        addr,
        config.upstream.base_url
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
