// Port for the external energy backend
use crate::domain::choropleth::to_number;
use crate::domain::filters::{DayType, Domain, Resolution};
use crate::domain::scenario::ScenarioTerritory;
use crate::domain::series::{Sector, SeriesPoint};
use crate::domain::territory::Level;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Filters shared by `/charts/values` and `/charts/series`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesQuery {
    pub level: Level,
    pub resolution: Resolution,
    pub year: i32,
    pub domain: Domain,
    pub scenario: String,
    pub day_type: Option<DayType>,
    pub base_group: Option<String>,
    pub category_code: Option<String>,
}

impl ValuesQuery {
    pub fn new(level: Level, resolution: Resolution, year: i32, domain: Domain, scenario: impl Into<String>) -> Self {
        Self {
            level,
            resolution,
            year,
            domain,
            scenario: scenario.into(),
            day_type: None,
            base_group: None,
            category_code: None,
        }
    }

    pub fn with_day_type(mut self, day_type: Option<DayType>) -> Self {
        self.day_type = day_type;
        self
    }

    pub fn with_base_group(mut self, base_group: impl Into<String>) -> Self {
        self.base_group = Some(base_group.into());
        self
    }

    pub fn with_category_code(mut self, category_code: impl Into<String>) -> Self {
        self.category_code = Some(category_code.into());
        self
    }

    /// Query string pairs; empty optional filters are left out.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("level", self.level.as_str().to_string()),
            ("resolution", self.resolution.as_str().to_string()),
            ("year", self.year.to_string()),
            ("domain", self.domain.as_str().to_string()),
        ];
        if !self.scenario.is_empty() {
            params.push(("scenario", self.scenario.clone()));
        }
        if let Some(day_type) = self.day_type {
            params.push(("day_type", day_type.as_str().to_string()));
        }
        if let Some(group) = self.base_group.as_ref().filter(|g| !g.is_empty()) {
            params.push(("base_group", group.clone()));
        }
        if let Some(code) = self.category_code.as_ref().filter(|c| !c.is_empty()) {
            params.push(("category_code", code.clone()));
        }
        params
    }
}

/// A values query narrowed to one territory.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesQuery {
    pub filter: ValuesQuery,
    pub code: i64,
}

impl SeriesQuery {
    pub fn new(filter: ValuesQuery, code: i64) -> Self {
        Self { filter, code }
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = self.filter.params();
        params.push((self.filter.level.code_param(), self.code.to_string()));
        params
    }
}

/// One row of `/charts/values`. Kept loose because the code column name
/// depends on the level and on which backend revision answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuesRow(pub Map<String, Value>);

impl ValuesRow {
    pub fn code(&self, level: Level) -> Option<i64> {
        let keys: &[&str] = match level {
            Level::Region => &["cod_reg", "reg_cod"],
            Level::Province => &["cod_prov", "prov_cod"],
            Level::Comune => &["pro_com", "mun_cod", "cod_com"],
        };
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find(|v| !v.is_null())
            .and_then(to_number)
            .map(|v| v as i64)
    }

    pub fn value(&self) -> Option<f64> {
        self.0.get("value_mwh").and_then(to_number)
    }
}

#[async_trait]
pub trait EnergyApi: Send + Sync {
    /// GeoJSON FeatureCollection of every territory at a level.
    async fn territories(&self, level: Level, simplify: f64) -> Result<Value>;

    /// Per-territory totals for the choropleth.
    async fn values(&self, query: &ValuesQuery) -> Result<Vec<ValuesRow>>;

    /// Time series for one territory.
    async fn series(&self, query: &SeriesQuery) -> Result<Vec<SeriesPoint>>;

    /// All scenario parameters for one territory.
    async fn scenario_territory(
        &self,
        level: Level,
        code: i64,
        scenario: &str,
        year: i32,
    ) -> Result<ScenarioTerritory>;

    async fn province_monthly_consumption(&self, sector: Sector, prov_cod: i64) -> Result<Value>;

    async fn province_production(&self, prov_cod: i64) -> Result<Value>;
}
