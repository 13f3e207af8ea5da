use crate::domain::choropleth::DEFAULT_PALETTE;
use crate::domain::territory::DEFAULT_SEARCH_LIMIT;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AtlasConfig {
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub map: MapSettings,
    #[serde(default)]
    pub territories: TerritorySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapSettings {
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,
    #[serde(default = "default_year")]
    pub default_year: i32,
    #[serde(default = "default_scenario")]
    pub default_scenario: String,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            palette: default_palette(),
            default_year: default_year(),
            default_scenario: default_scenario(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TerritorySettings {
    #[serde(default = "default_index_path")]
    pub index_path: String,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for TerritorySettings {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_palette() -> Vec<String> {
    DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
}

fn default_year() -> i32 {
    2019
}

fn default_scenario() -> String {
    "0".to_string()
}

fn default_index_path() -> String {
    "data/territory_index.json".to_string()
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

/// `config/atlas.toml`, then an optional `config/atlas.local`, then
/// `ATLAS__SECTION__KEY` environment variables.
pub fn load_config() -> anyhow::Result<AtlasConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/atlas"))
        .add_source(config::File::with_name("config/atlas.local").required(false))
        .add_source(
            config::Environment::with_prefix("ATLAS")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
