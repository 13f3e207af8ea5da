// HTTP client for the external energy backend
use crate::application::energy_api::{EnergyApi, SeriesQuery, ValuesQuery, ValuesRow};
use crate::domain::scenario::ScenarioTerritory;
use crate::domain::series::{Sector, SeriesPoint};
use crate::domain::territory::Level;
use crate::error::{AtlasError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpEnergyApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEnergyApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Joins path and query; params with empty values are dropped.
    fn build_url(&self, path: &str, params: &[(&str, String)]) -> String {
        let path = path.trim_start_matches('/');
        let query: Vec<String> = params
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();

        if query.is_empty() {
            format!("{}/{}", self.base_url, path)
        } else {
            format!("{}/{}?{}", self.base_url, path, query.join("&"))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = self.build_url(path, params);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::warn!("Energy API {} answered {}: {}", url, status, body);
            return Err(AtlasError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl EnergyApi for HttpEnergyApi {
    async fn territories(&self, level: Level, simplify: f64) -> Result<Value> {
        self.get_json(
            "/map/territories",
            &[("level", level.as_str().to_string()), ("simplify", simplify.to_string())],
        )
        .await
    }

    async fn values(&self, query: &ValuesQuery) -> Result<Vec<ValuesRow>> {
        // The backend answers null instead of [] for empty selections
        let rows: Option<Vec<ValuesRow>> = self.get_json("/charts/values", &query.params()).await?;
        Ok(rows.unwrap_or_default())
    }

    async fn series(&self, query: &SeriesQuery) -> Result<Vec<SeriesPoint>> {
        let points: Option<Vec<SeriesPoint>> = self.get_json("/charts/series", &query.params()).await?;
        Ok(points.unwrap_or_default())
    }

    async fn scenario_territory(
        &self,
        level: Level,
        code: i64,
        scenario: &str,
        year: i32,
    ) -> Result<ScenarioTerritory> {
        self.get_json(
            "/scenarios/territory",
            &[
                ("level", level.as_str().to_string()),
                (level.code_param(), code.to_string()),
                ("scenario", scenario.to_string()),
                ("year", year.to_string()),
            ],
        )
        .await
    }

    async fn province_monthly_consumption(&self, sector: Sector, prov_cod: i64) -> Result<Value> {
        let path = format!("/consumption/province/monthly/{}/{}", sector.as_str(), prov_cod);
        self.get_json(&path, &[]).await
    }

    async fn province_production(&self, prov_cod: i64) -> Result<Value> {
        self.get_json(&format!("/production/{}", prov_cod), &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filters::{Domain, Resolution};
    use httpmock::prelude::*;
    use serde_json::json;

    fn api(server: &MockServer) -> HttpEnergyApi {
        HttpEnergyApi::new(&server.base_url(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_build_url() {
        let api = HttpEnergyApi::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        let url = api.build_url(
            "/charts/values",
            &[("level", "province".into()), ("base_group", String::new()), ("q", "a b".into())],
        );
        assert_eq!(url, "http://localhost:5000/charts/values?level=province&q=a%20b");
        assert_eq!(api.build_url("production/1", &[]), "http://localhost:5000/production/1");
    }

    #[tokio::test]
    async fn test_territories_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/map/territories")
                .query_param("level", "province")
                .query_param("simplify", "0.005");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({"type": "FeatureCollection", "features": []}));
        });

        let fc = api(&server).territories(Level::Province, 0.005).await.unwrap();
        mock.assert();
        assert_eq!(fc["type"], "FeatureCollection");
    }

    #[tokio::test]
    async fn test_series_request_carries_code() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/charts/series")
                .query_param("level", "comune")
                .query_param("comune_code", "1272")
                .query_param("category_code", "cons_domestic");
            then.status(200).json_body(json!([{"x": 1, "value_mwh": 3.5}]));
        });

        let filter = ValuesQuery::new(Level::Comune, Resolution::Monthly, 2019, Domain::Consumption, "0")
            .with_category_code("cons_domestic");
        let points = api(&server).series(&SeriesQuery::new(filter, 1272)).await.unwrap();
        mock.assert();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value(), Some(3.5));
    }

    #[tokio::test]
    async fn test_error_status_is_reported_with_truncated_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/production/999");
            then.status(404).body("x".repeat(500));
        });

        let err = api(&server).province_production(999).await.unwrap_err();
        match err {
            AtlasError::Upstream { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body.len(), ERROR_BODY_LIMIT);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scenario_territory_uses_level_code_param() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/scenarios/territory")
                .query_param("level", "region")
                .query_param("region_code", "1")
                .query_param("scenario", "4")
                .query_param("year", "2030");
            then.status(200).json_body(json!({
                "scenario": "4",
                "year": 2030,
                "territory": {"level": "region", "name": "Piemonte", "territory_id": 1},
                "values": {}
            }));
        });

        let resp = api(&server).scenario_territory(Level::Region, 1, "4", 2030).await.unwrap();
        mock.assert();
        assert_eq!(resp.territory.name, "Piemonte");
    }
}
