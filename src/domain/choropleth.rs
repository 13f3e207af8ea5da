// Choropleth class breaks, colour lookup and feature colouring
use super::territory::Level;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const FALLBACK_COLOR: &str = "#ccc";
pub const PENDING_COLOR: &str = "#e0e0e0";

pub const DEFAULT_PALETTE: [&str; 6] = [
    "#FFFFB2", "#FECC5C", "#FD8D3C", "#F03B20", "#BD0026", "#800026",
];

/// Quantile breakpoints over the finite values: `classes + 1` entries
/// running from min to max, or none for empty input.
pub fn quantile_breaks(values: &[f64], classes: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() || classes == 0 {
        return Vec::new();
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    // floor(i / classes * (n - 1)) without float rounding
    let n = sorted.len();
    (0..=classes)
        .map(|i| sorted[(i * (n - 1) / classes).min(n - 1)])
        .collect()
}

/// Index of the class containing `value`. Classes are half-open except
/// the last, which includes the upper break.
pub fn class_index(value: f64, breaks: &[f64]) -> Option<usize> {
    if !value.is_finite() || breaks.len() < 2 {
        return None;
    }
    let last = breaks.len() - 2;
    breaks.windows(2).enumerate().find_map(|(i, w)| {
        let (from, to) = (w[0], w[1]);
        let inside = if i == last {
            value >= from && value <= to
        } else {
            value >= from && value < to
        };
        inside.then_some(i)
    })
}

pub fn color_for_value<'a>(value: Option<f64>, breaks: &[f64], colors: &'a [String]) -> &'a str {
    let Some(idx) = value.and_then(|v| class_index(v, breaks)) else {
        return FALLBACK_COLOR;
    };
    colors
        .get(idx)
        .or_else(|| colors.last())
        .map(String::as_str)
        .unwrap_or(FALLBACK_COLOR)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub colors: Vec<String>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Palette {
    pub fn new(colors: Vec<String>) -> Self {
        if colors.is_empty() {
            return Self::default();
        }
        Self { colors }
    }

    pub fn classes(&self) -> usize {
        self.colors.len()
    }

    pub fn breaks(&self, values: &[f64]) -> Vec<f64> {
        quantile_breaks(values, self.classes())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub color: String,
    pub from: f64,
    pub to: f64,
}

pub fn legend(breaks: &[f64], colors: &[String]) -> Vec<LegendEntry> {
    breaks
        .windows(2)
        .enumerate()
        .map(|(i, w)| LegendEntry {
            color: colors
                .get(i)
                .or_else(|| colors.last())
                .cloned()
                .unwrap_or_else(|| FALLBACK_COLOR.to_string()),
            from: w[0],
            to: w[1],
        })
        .collect()
}

/// Accepts finite numbers and numeric strings.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn code_keys(level: Level) -> &'static [&'static str] {
    match level {
        Level::Region => &[
            "COD_REG", "cod_reg", "REG_COD", "reg_cod", "REGION_CODE", "region_code", "id_reg",
            "id",
        ],
        Level::Province => &[
            "COD_PROV", "cod_prov", "PROV_COD", "prov_cod", "COD_UTS", "cod_uts", "UTS_CODE",
            "uts_code", "id_prov", "id",
        ],
        Level::Comune => &[
            "PRO_COM", "pro_com", "MUN_COD", "mun_cod", "COD_COM", "cod_com", "ISTAT", "istat",
            "ISTAT_COM", "istat_com", "id_mun", "id",
        ],
    }
}

/// Territory code of a feature, trying the ISTAT property aliases in order.
pub fn feature_code(level: Level, properties: &Map<String, Value>) -> Option<i64> {
    code_keys(level)
        .iter()
        .filter_map(|key| properties.get(*key))
        .find_map(to_number)
        .map(|v| v as i64)
}

/// Adds `fill_color`, `value_mwh` and `class_index` to every feature of a
/// GeoJSON FeatureCollection. Without breaks every feature gets the
/// pending colour.
pub fn colorize(
    collection: &mut Value,
    level: Level,
    values: &HashMap<i64, f64>,
    breaks: &[f64],
    palette: &Palette,
) {
    let Some(features) = collection.get_mut("features").and_then(Value::as_array_mut) else {
        return;
    };

    for feature in features {
        let Some(obj) = feature.as_object_mut() else {
            continue;
        };
        let props = obj
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        if !props.is_object() {
            *props = Value::Object(Map::new());
        }
        let Some(props) = props.as_object_mut() else {
            continue;
        };

        let value = feature_code(level, props).and_then(|code| values.get(&code).copied());
        let (color, class) = if breaks.is_empty() {
            (PENDING_COLOR.to_string(), None)
        } else {
            (
                color_for_value(value, breaks, &palette.colors).to_string(),
                value.and_then(|v| class_index(v, breaks)),
            )
        };

        props.insert("fill_color".into(), Value::String(color));
        props.insert("value_mwh".into(), value.map(Value::from).unwrap_or(Value::Null));
        props.insert("class_index".into(), class.map(Value::from).unwrap_or(Value::Null));
    }
}
