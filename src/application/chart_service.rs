// Chart service - monthly, daily and hourly series for one territory
use crate::application::energy_api::{EnergyApi, SeriesQuery, ValuesQuery};
use crate::domain::filters::{DayType, Domain, Resolution};
use crate::domain::series::{
    apply_monthly, empty_monthly, normalize_hourly, to_series12, DailyProfile, HourlyPoint,
    MonthlyColumn, MonthlyRow, Sector, Source,
};
use crate::domain::territory::Level;
use crate::error::Result;
use futures::future::try_join_all;
use std::sync::Arc;

#[derive(Clone)]
pub struct ChartService {
    api: Arc<dyn EnergyApi>,
}

impl ChartService {
    pub fn new(api: Arc<dyn EnergyApi>) -> Self {
        Self { api }
    }

    fn monthly_requests(level: Level, year: i32, scenario: &str) -> Vec<(MonthlyColumn, ValuesQuery)> {
        let base = |domain| ValuesQuery::new(level, Resolution::Monthly, year, domain, scenario);

        let mut requests = vec![
            (MonthlyColumn::TotalConsumption, base(Domain::Consumption)),
            (MonthlyColumn::TotalProduction, base(Domain::Production)),
        ];
        requests.extend(Sector::ALL.iter().map(|sector| {
            (
                MonthlyColumn::Sector(*sector),
                base(Domain::Consumption).with_category_code(sector.category_code()),
            )
        }));
        requests.extend(Source::ALL.iter().map(|source| {
            (
                MonthlyColumn::Source(*source),
                base(Domain::Production).with_base_group(source.as_str()),
            )
        }));
        requests
    }

    /// Totals plus per-sector and per-source breakdown, Jan..Dec in GWh.
    pub async fn monthly(
        &self,
        level: Level,
        code: Option<i64>,
        year: i32,
        scenario: &str,
    ) -> Result<Vec<MonthlyRow>> {
        let Some(code) = code else {
            return Ok(Vec::new());
        };

        let requests = Self::monthly_requests(level, year, scenario);
        let fetches = requests.iter().map(|(column, filter)| {
            let query = SeriesQuery::new(filter.clone(), code);
            async move { self.api.series(&query).await.map(|points| (*column, points)) }
        });

        let results = match try_join_all(fetches).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Monthly chart for {} {} failed: {}", level, code, e);
                return Err(e);
            }
        };

        let mut rows = empty_monthly();
        for (column, points) in &results {
            apply_monthly(&mut rows, points, *column);
        }
        tracing::debug!("Monthly chart for {} {}: {} series", level, code, results.len());
        Ok(rows)
    }

    /// Weekday and weekend monthly totals for a province.
    pub async fn daily(
        &self,
        province_code: Option<i64>,
        year: i32,
        domain: Domain,
    ) -> Result<Option<DailyProfile>> {
        let Some(code) = province_code else {
            return Ok(None);
        };

        // The daily profile is not scenario-specific; no scenario is sent
        let query = |day_type| {
            let filter = ValuesQuery::new(Level::Province, Resolution::Monthly, year, domain, "")
                .with_day_type(Some(day_type));
            SeriesQuery::new(filter, code)
        };
        let (weekday, weekend) = (query(DayType::Weekday), query(DayType::Weekend));

        let (weekday, weekend) =
            futures::future::try_join(self.api.series(&weekday), self.api.series(&weekend)).await?;

        Ok(Some(DailyProfile {
            province_code: code,
            domain: domain.as_str().to_string(),
            year,
            weekday: to_series12(&weekday),
            weekend: to_series12(&weekend),
        }))
    }

    /// 24 hourly values, hour 0..23.
    pub async fn hourly(
        &self,
        level: Level,
        code: Option<i64>,
        year: i32,
        scenario: &str,
        domain: Domain,
        day_type: Option<DayType>,
    ) -> Result<Vec<HourlyPoint>> {
        let Some(code) = code else {
            return Ok(Vec::new());
        };

        let filter = ValuesQuery::new(level, Resolution::Hourly, year, domain, scenario).with_day_type(day_type);
        let points = self.api.series(&SeriesQuery::new(filter, code)).await?;
        Ok(normalize_hourly(&points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::energy_api::stub::StubApi;
    use crate::domain::series::SeriesPoint;
    use crate::error::AtlasError;

    fn service(stub: StubApi) -> (ChartService, Arc<StubApi>) {
        let stub = Arc::new(stub);
        (ChartService::new(stub.clone()), stub)
    }

    #[tokio::test]
    async fn test_monthly_issues_eleven_requests() {
        let mut stub = StubApi::default();
        stub.series.insert("consumption::".into(), vec![SeriesPoint::new(1, 4000.0)]);
        stub.series.insert("production:solar:".into(), vec![SeriesPoint::new(6, 1500.0)]);
        stub.series.insert("consumption:cons_tertiary:".into(), vec![SeriesPoint::new(2, 250.0)]);
        let (charts, stub) = service(stub);

        let rows = charts.monthly(Level::Province, Some(1), 2019, "0").await.unwrap();

        assert_eq!(stub.call_count(), 11);
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].total_consumption, 4.0);
        assert_eq!(rows[5].solar, 1.5);
        assert_eq!(rows[1].tertiary, 0.25);
        assert_eq!(rows[3].wind, 0.0);
    }

    #[tokio::test]
    async fn test_no_code_means_no_requests() {
        let (charts, stub) = service(StubApi::default());

        assert!(charts.monthly(Level::Region, None, 2019, "0").await.unwrap().is_empty());
        assert!(charts.daily(None, 2019, Domain::Consumption).await.unwrap().is_none());
        assert!(charts
            .hourly(Level::Comune, None, 2019, "0", Domain::Production, None)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_daily_profile_splits_day_types() {
        let mut stub = StubApi::default();
        stub.series.insert("consumption::weekday".into(), vec![SeriesPoint::new(1, 10.0)]);
        stub.series.insert("consumption::weekend".into(), vec![SeriesPoint::new(12, 3.0)]);
        let (charts, stub) = service(stub);

        let profile = charts.daily(Some(1), 2019, Domain::Consumption).await.unwrap().unwrap();
        let queries = stub.series_queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        for query in queries.iter() {
            let params = query.params();
            assert!(params.iter().all(|(key, _)| *key != "scenario"));
            assert!(params.contains(&("province_code", "1".to_string())));
        }
        assert_eq!(profile.weekday[0], 10.0);
        assert_eq!(profile.weekend[11], 3.0);
        assert_eq!(profile.chart_rows().len(), 12);
    }

    #[tokio::test]
    async fn test_hourly_pads_to_24() {
        let mut stub = StubApi::default();
        stub.series.insert("production::weekend".into(), vec![SeriesPoint::new(13, 7.0)]);
        let (charts, _) = service(stub);

        let hourly = charts
            .hourly(Level::Comune, Some(1272), 2019, "0", Domain::Production, Some(DayType::Weekend))
            .await
            .unwrap();
        assert_eq!(hourly.len(), 24);
        assert_eq!(hourly[12].value_mwh, 7.0);
    }

    #[tokio::test]
    async fn test_monthly_error_propagates() {
        struct Failing;
        #[async_trait::async_trait]
        impl EnergyApi for Failing {
            async fn territories(&self, _: Level, _: f64) -> Result<serde_json::Value> {
                unreachable!()
            }
            async fn values(&self, _: &ValuesQuery) -> Result<Vec<crate::application::energy_api::ValuesRow>> {
                unreachable!()
            }
            async fn series(&self, _: &SeriesQuery) -> Result<Vec<SeriesPoint>> {
                Err(AtlasError::Upstream { status: 500, body: "down".into() })
            }
            async fn scenario_territory(
                &self,
                _: Level,
                _: i64,
                _: &str,
                _: i32,
            ) -> Result<crate::domain::scenario::ScenarioTerritory> {
                unreachable!()
            }
            async fn province_monthly_consumption(&self, _: Sector, _: i64) -> Result<serde_json::Value> {
                unreachable!()
            }
            async fn province_production(&self, _: i64) -> Result<serde_json::Value> {
                unreachable!()
            }
        }

        let charts = ChartService::new(Arc::new(Failing));
        let err = charts.monthly(Level::Region, Some(1), 2019, "0").await.unwrap_err();
        assert!(matches!(err, AtlasError::Upstream { status: 500, .. }));
    }
}
