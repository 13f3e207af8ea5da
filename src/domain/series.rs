// Chart series shapes returned by /charts/series and their chart-ready forms
use super::choropleth::to_number;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Raw `{x, value_mwh}` point. Either field may be null or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    #[serde(default)]
    pub x: Value,
    #[serde(default)]
    pub value_mwh: Value,
}

impl SeriesPoint {
    pub fn new(x: i64, value_mwh: f64) -> Self {
        Self {
            x: Value::from(x),
            value_mwh: Value::from(value_mwh),
        }
    }

    pub fn x(&self) -> Option<i64> {
        to_number(&self.x).map(|v| v as i64)
    }

    pub fn value(&self) -> Option<f64> {
        to_number(&self.value_mwh)
    }
}

pub fn mwh_to_gwh(mwh: f64) -> f64 {
    mwh / 1000.0
}

/// Consumption sectors with their backend category codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Residential,
    Primary,
    Secondary,
    Tertiary,
}

impl Sector {
    pub const ALL: [Sector; 4] = [
        Sector::Residential,
        Sector::Primary,
        Sector::Secondary,
        Sector::Tertiary,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "residential" => Some(Self::Residential),
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            "tertiary" => Some(Self::Tertiary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Residential => "residential",
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Tertiary => "tertiary",
        }
    }

    pub fn category_code(&self) -> &'static str {
        match self {
            Self::Residential => "cons_domestic",
            Self::Primary => "cons_primary",
            Self::Secondary => "cons_secondary",
            Self::Tertiary => "cons_tertiary",
        }
    }
}

/// Production sources, matching the backend's `base_group` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Solar,
    Wind,
    Hydroelectric,
    Geothermal,
    Biomass,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Solar,
        Source::Wind,
        Source::Hydroelectric,
        Source::Geothermal,
        Source::Biomass,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "solar" => Some(Self::Solar),
            "wind" => Some(Self::Wind),
            "hydroelectric" | "hydro" => Some(Self::Hydroelectric),
            "geothermal" => Some(Self::Geothermal),
            "biomass" => Some(Self::Biomass),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solar => "solar",
            Self::Wind => "wind",
            Self::Hydroelectric => "hydroelectric",
            Self::Geothermal => "geothermal",
            Self::Biomass => "biomass",
        }
    }
}

/// One month of the combined consumption/production chart, in GWh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyRow {
    pub month: &'static str,
    pub total_consumption: f64,
    pub total_production: f64,
    pub solar: f64,
    pub wind: f64,
    pub hydroelectric: f64,
    pub geothermal: f64,
    pub biomass: f64,
    pub residential: f64,
    pub primary: f64,
    pub secondary: f64,
    pub tertiary: f64,
}

/// Which column of [`MonthlyRow`] a fetched series fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthlyColumn {
    TotalConsumption,
    TotalProduction,
    Sector(Sector),
    Source(Source),
}

impl MonthlyRow {
    fn slot(&mut self, column: MonthlyColumn) -> &mut f64 {
        match column {
            MonthlyColumn::TotalConsumption => &mut self.total_consumption,
            MonthlyColumn::TotalProduction => &mut self.total_production,
            MonthlyColumn::Sector(Sector::Residential) => &mut self.residential,
            MonthlyColumn::Sector(Sector::Primary) => &mut self.primary,
            MonthlyColumn::Sector(Sector::Secondary) => &mut self.secondary,
            MonthlyColumn::Sector(Sector::Tertiary) => &mut self.tertiary,
            MonthlyColumn::Source(Source::Solar) => &mut self.solar,
            MonthlyColumn::Source(Source::Wind) => &mut self.wind,
            MonthlyColumn::Source(Source::Hydroelectric) => &mut self.hydroelectric,
            MonthlyColumn::Source(Source::Geothermal) => &mut self.geothermal,
            MonthlyColumn::Source(Source::Biomass) => &mut self.biomass,
        }
    }
}

/// Twelve zeroed rows, Jan..Dec.
pub fn empty_monthly() -> Vec<MonthlyRow> {
    MONTH_LABELS
        .iter()
        .map(|&month| MonthlyRow {
            month,
            ..Default::default()
        })
        .collect()
}

/// Writes a monthly series (x = 1..12, MWh) into one column as GWh.
pub fn apply_monthly(rows: &mut [MonthlyRow], series: &[SeriesPoint], column: MonthlyColumn) {
    for point in series {
        let Some(month) = point.x() else { continue };
        if !(1..=12).contains(&month) {
            continue;
        }
        if let Some(row) = rows.get_mut((month - 1) as usize) {
            *row.slot(column) = mwh_to_gwh(point.value().unwrap_or(0.0));
        }
    }
}

/// Monthly series as a 12-slot array; out-of-range months are dropped.
pub fn to_series12(series: &[SeriesPoint]) -> [f64; 12] {
    let mut out = [0.0; 12];
    for point in series {
        let Some(month) = point.x() else { continue };
        if (1..=12).contains(&month) {
            out[(month - 1) as usize] = point.value().unwrap_or(0.0);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub month: &'static str,
    pub weekday: f64,
    pub weekend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyProfile {
    pub province_code: i64,
    pub domain: String,
    pub year: i32,
    pub weekday: [f64; 12],
    pub weekend: [f64; 12],
}

impl DailyProfile {
    pub fn chart_rows(&self) -> Vec<DailyRow> {
        MONTH_LABELS
            .iter()
            .enumerate()
            .map(|(i, &month)| DailyRow {
                month,
                weekday: self.weekday[i],
                weekend: self.weekend[i],
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyPoint {
    pub hour: u8,
    pub value_mwh: f64,
}

/// Backend hours are 1..24; the chart wants 0..23 with every hour present.
pub fn normalize_hourly(series: &[SeriesPoint]) -> Vec<HourlyPoint> {
    let mut by_hour = [0.0; 24];
    for point in series {
        let (Some(x), Some(value)) = (point.x(), point.value()) else {
            continue;
        };
        let hour = x - 1;
        if (0..24).contains(&hour) {
            by_hour[hour as usize] = value;
        }
    }
    by_hour
        .iter()
        .enumerate()
        .map(|(hour, value_mwh)| HourlyPoint {
            hour: hour as u8,
            value_mwh: *value_mwh,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_accepts_strings_and_nulls() {
        let points: Vec<SeriesPoint> =
            serde_json::from_value(json!([{"x": "3", "value_mwh": "12.5"}, {"x": null, "value_mwh": 1}, {"x": 4}]))
                .unwrap();
        assert_eq!(points[0].x(), Some(3));
        assert_eq!(points[0].value(), Some(12.5));
        assert_eq!(points[1].x(), None);
        assert_eq!(points[2].value(), None);
    }

    #[test]
    fn test_apply_monthly_converts_and_ignores_out_of_range() {
        let mut rows = empty_monthly();
        let series = vec![
            SeriesPoint::new(1, 2500.0),
            SeriesPoint::new(12, 1000.0),
            SeriesPoint::new(13, 9999.0),
            SeriesPoint::new(0, 9999.0),
        ];
        apply_monthly(&mut rows, &series, MonthlyColumn::Source(Source::Solar));
        apply_monthly(&mut rows, &[SeriesPoint::new(2, 500.0)], MonthlyColumn::Sector(Sector::Tertiary));

        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].month, "Jan");
        assert_eq!(rows[0].solar, 2.5);
        assert_eq!(rows[11].solar, 1.0);
        assert_eq!(rows[1].tertiary, 0.5);
        assert_eq!(rows[5].solar, 0.0);
    }

    #[test]
    fn test_to_series12() {
        let arr = to_series12(&[SeriesPoint::new(3, 7.0), SeriesPoint::new(15, 1.0)]);
        assert_eq!(arr[2], 7.0);
        assert_eq!(arr.iter().sum::<f64>(), 7.0);
    }

    #[test]
    fn test_normalize_hourly_pads_24() {
        let hourly = normalize_hourly(&[SeriesPoint::new(1, 4.0), SeriesPoint::new(24, 8.0), SeriesPoint::new(25, 1.0)]);
        assert_eq!(hourly.len(), 24);
        assert_eq!(hourly[0], HourlyPoint { hour: 0, value_mwh: 4.0 });
        assert_eq!(hourly[23].value_mwh, 8.0);
        assert_eq!(hourly[12].value_mwh, 0.0);
    }

    #[test]
    fn test_daily_chart_rows() {
        let mut weekday = [0.0; 12];
        weekday[0] = 3.0;
        let profile = DailyProfile {
            province_code: 1,
            domain: "consumption".into(),
            year: 2019,
            weekday,
            weekend: [1.0; 12],
        };
        let rows = profile.chart_rows();
        assert_eq!(rows[0], DailyRow { month: "Jan", weekday: 3.0, weekend: 1.0 });
        assert_eq!(rows[11].month, "Dec");
    }

    #[test]
    fn test_sector_codes() {
        assert_eq!(Sector::Residential.category_code(), "cons_domestic");
        assert_eq!(Sector::parse("Tertiary"), Some(Sector::Tertiary));
        assert_eq!(Source::parse("hydro"), Some(Source::Hydroelectric));
    }
}
