// Scenario metrics for one territory and their panel groupings
use super::territory::Level;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

const CATALOGUE: [(&str, &str, &str, &str, &str); 10] = [
    ("consumption_mwh", "Consumption", "MWh", "Energy (MWh)", "number"),
    ("production_mwh", "Production", "MWh", "Energy (MWh)", "number"),
    ("self_consumption_mwh", "Self-consumption", "MWh", "Energy (MWh)", "number"),
    ("over_production_mwh", "Over-production (Surplus)", "MWh", "Energy (MWh)", "number"),
    ("uncovered_demand_mwh", "Uncovered demand", "MWh", "Energy (MWh)", "number"),
    (
        "community_self_consumption_mwh",
        "Community self-consumption (CSC)",
        "MWh",
        "Community (MWh)",
        "number",
    ),
    (
        "community_self_consumption_total_mwh",
        "SC + CSC (Total self-consumption)",
        "MWh",
        "Community (MWh)",
        "number",
    ),
    ("self_consumption_index", "SCI (Self-consumption index)", "ratio", "Indexes", "ratio"),
    ("self_sufficiency_index", "SSI (Self-sufficiency index)", "ratio", "Indexes", "ratio"),
    ("over_production_index", "OPI (Over-production index)", "ratio", "Indexes", "ratio"),
];

/// Display metadata for a scenario parameter key.
pub fn param_meta(key: &str) -> ParamMeta {
    match CATALOGUE.iter().find(|(k, ..)| *k == key) {
        Some((_, label, unit, group, format)) => ParamMeta {
            label: Some(label.to_string()),
            unit: Some(unit.to_string()),
            group: Some(group.to_string()),
            format: Some(format.to_string()),
        },
        None => ParamMeta {
            label: Some(key.to_string()),
            unit: None,
            group: Some("Other".to_string()),
            format: Some("number".to_string()),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTerritoryInfo {
    pub level: Level,
    pub name: String,
    pub territory_id: i64,
    #[serde(default)]
    pub reg_cod: Option<i64>,
    #[serde(default)]
    pub prov_cod: Option<i64>,
    #[serde(default)]
    pub mun_cod: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ParamMeta>,
}

/// Response of `/scenarios/territory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTerritory {
    pub scenario: String,
    pub year: i32,
    pub territory: ScenarioTerritoryInfo,
    #[serde(default)]
    pub values: BTreeMap<String, MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricItem {
    pub key: String,
    pub value: Option<f64>,
    pub unit: String,
    pub label: String,
    pub group: String,
    pub format: String,
}

impl MetricItem {
    /// Upstream metadata wins field by field; the built-in catalogue fills
    /// whatever it leaves out.
    fn from_entry(key: &str, metric: &MetricValue) -> Self {
        let meta = metric.meta.clone().unwrap_or_default();
        let known = param_meta(key);
        Self {
            key: key.to_string(),
            value: metric.value,
            unit: meta
                .unit
                .or_else(|| metric.unit.clone())
                .or(known.unit)
                .unwrap_or_default(),
            label: meta.label.or(known.label).unwrap_or_else(|| key.to_string()),
            group: meta.group.or(known.group).unwrap_or_default(),
            format: meta.format.or(known.format).unwrap_or_default(),
        }
    }

    pub fn is_index(&self) -> bool {
        self.group == "Indexes" || self.format == "ratio"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSplit {
    pub indexes: Vec<MetricItem>,
    pub energy: Vec<MetricItem>,
}

fn items(resp: &ScenarioTerritory) -> Vec<MetricItem> {
    resp.values
        .iter()
        .map(|(key, metric)| MetricItem::from_entry(key, metric))
        .collect()
}

/// Separates ratio indexes from energy quantities, each sorted by label.
pub fn split_metrics(resp: Option<&ScenarioTerritory>) -> MetricSplit {
    let Some(resp) = resp else {
        return MetricSplit::default();
    };
    let (mut indexes, mut energy): (Vec<_>, Vec<_>) =
        items(resp).into_iter().partition(MetricItem::is_index);
    indexes.sort_by(|a, b| a.label.cmp(&b.label));
    energy.sort_by(|a, b| a.label.cmp(&b.label));
    MetricSplit { indexes, energy }
}

pub fn extract_index_metrics(resp: Option<&ScenarioTerritory>) -> Vec<MetricItem> {
    split_metrics(resp).indexes
}

/// Result of loading the same territory under several scenarios.
/// Failed scenarios map to `None` and carry a message in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioComparison {
    pub by_scenario: BTreeMap<String, Option<ScenarioTerritory>>,
    pub errors: BTreeMap<String, String>,
}

impl ScenarioComparison {
    pub fn record(&mut self, scenario: String, outcome: Result<ScenarioTerritory, String>) {
        match outcome {
            Ok(resp) => {
                self.by_scenario.insert(scenario, Some(resp));
            }
            Err(message) => {
                self.by_scenario.insert(scenario.clone(), None);
                self.errors.insert(scenario, message);
            }
        }
    }

    /// Index metrics per scenario, for the comparison cards.
    pub fn index_cards(&self) -> BTreeMap<String, Vec<MetricItem>> {
        self.by_scenario
            .iter()
            .map(|(id, resp)| (id.clone(), extract_index_metrics(resp.as_ref())))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_response(scenario: &str) -> ScenarioTerritory {
        serde_json::from_value(json!({
            "scenario": scenario,
            "year": 2019,
            "territory": {
                "level": "province", "name": "Torino", "territory_id": 7,
                "reg_cod": 1, "prov_cod": 1, "mun_cod": null
            },
            "values": {
                "self_sufficiency_index": {
                    "value": 0.42, "unit": "ratio",
                    "meta": {"label": "SSI (Self-sufficiency index)", "group": "Indexes", "format": "ratio", "unit": "ratio"}
                },
                "consumption_mwh": {
                    "value": 1200.0, "unit": "MWh",
                    "meta": {"label": "Consumption", "group": "Energy (MWh)", "format": "number", "unit": "MWh"}
                },
                "production_mwh": {"value": null, "unit": "MWh"},
                "self_consumption_index": {
                    "value": 0.8,
                    "meta": {"label": "SCI (Self-consumption index)", "group": "Indexes", "format": "ratio"}
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_param_meta_fallback() {
        let meta = param_meta("self_sufficiency_index");
        assert_eq!(meta.group.as_deref(), Some("Indexes"));
        let meta = param_meta("mystery_key");
        assert_eq!(meta.label.as_deref(), Some("mystery_key"));
        assert_eq!(meta.group.as_deref(), Some("Other"));
        assert_eq!(meta.unit, None);
    }

    #[test]
    fn test_split_metrics() {
        let resp = sample_response("4");
        let split = split_metrics(Some(&resp));

        let index_labels: Vec<&str> = split.indexes.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(
            index_labels,
            vec!["SCI (Self-consumption index)", "SSI (Self-sufficiency index)"]
        );

        let energy_labels: Vec<&str> = split.energy.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(energy_labels, vec!["Consumption", "Production"]);
        assert_eq!(split.energy[1].unit, "MWh");
        assert_eq!(split.energy[1].group, "Energy (MWh)");
        assert_eq!(split.energy[1].value, None);
    }

    #[test]
    fn test_catalogue_fills_missing_meta() {
        let metric = MetricValue {
            value: Some(0.3),
            unit: None,
            meta: Some(ParamMeta {
                label: Some("Over-production".into()),
                ..Default::default()
            }),
        };
        let item = MetricItem::from_entry("over_production_index", &metric);
        assert_eq!(item.label, "Over-production");
        assert_eq!(item.group, "Indexes");
        assert_eq!(item.unit, "ratio");
        assert!(item.is_index());

        let unknown = MetricItem::from_entry("mystery_key", &MetricValue { value: None, unit: None, meta: None });
        assert_eq!(unknown.label, "mystery_key");
        assert_eq!(unknown.group, "Other");
        assert!(!unknown.is_index());
    }

    #[test]
    fn test_split_metrics_none() {
        assert_eq!(split_metrics(None), MetricSplit::default());
    }

    #[test]
    fn test_comparison_records_failures_only_in_errors() {
        let mut cmp = ScenarioComparison::default();
        cmp.record("4".into(), Ok(sample_response("4")));
        cmp.record("5".into(), Err("500 boom".into()));

        assert_eq!(cmp.by_scenario.len(), 2);
        assert!(cmp.by_scenario["5"].is_none());
        assert_eq!(cmp.errors.len(), 1);
        assert_eq!(cmp.errors["5"], "500 boom");

        let cards = cmp.index_cards();
        assert_eq!(cards["4"].len(), 2);
        assert!(cards["5"].is_empty());
    }
}
