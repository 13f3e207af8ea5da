// Scenario service - territory metrics and multi-scenario comparison
use crate::application::energy_api::EnergyApi;
use crate::domain::scenario::{split_metrics, MetricSplit, ScenarioComparison, ScenarioTerritory};
use crate::domain::territory::Level;
use crate::error::{AtlasError, Result};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioView {
    pub response: ScenarioTerritory,
    pub metrics: MetricSplit,
}

#[derive(Clone)]
pub struct ScenarioService {
    api: Arc<dyn EnergyApi>,
}

impl ScenarioService {
    pub fn new(api: Arc<dyn EnergyApi>) -> Self {
        Self { api }
    }

    pub async fn territory(&self, level: Level, code: i64, scenario: &str, year: i32) -> Result<ScenarioView> {
        if scenario.trim().is_empty() {
            return Err(AtlasError::invalid("Missing scenario"));
        }
        let response = self.api.scenario_territory(level, code, scenario, year).await?;
        let metrics = split_metrics(Some(&response));
        Ok(ScenarioView { response, metrics })
    }

    /// Loads every scenario concurrently. A failing scenario is recorded
    /// in `errors` and does not fail the batch.
    pub async fn compare(
        &self,
        level: Level,
        code: i64,
        year: i32,
        scenarios: &[String],
    ) -> ScenarioComparison {
        let ids: BTreeSet<&String> = scenarios.iter().filter(|s| !s.trim().is_empty()).collect();

        let fetches = ids.iter().map(|id| async move {
            let outcome = self.api.scenario_territory(level, code, id, year).await;
            ((*id).clone(), outcome)
        });

        let mut comparison = ScenarioComparison::default();
        for (id, outcome) in join_all(fetches).await {
            let outcome = outcome.map_err(|e| {
                tracing::warn!("Scenario {} for {} {} failed: {}", id, level, code, e);
                e.to_string()
            });
            comparison.record(id, outcome);
        }
        comparison
    }
}
