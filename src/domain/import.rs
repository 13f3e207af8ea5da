// Admin data-import preview: CSV validation before loading into the warehouse
use super::choropleth::quantile_breaks;
use super::filters::{Domain, Resolution};
use super::series::Source;
use super::territory::Level;
use crate::error::{AtlasError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

const PERIOD_COLUMNS: [&str; 4] = ["month", "period", "x", "date"];
const VALUE_COLUMNS: [&str; 3] = ["value", "value_mwh", "mwh"];
const OUTLIER_FENCE: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportContext {
    pub level: Level,
    pub domain: Domain,
    #[serde(default)]
    pub source: Option<Source>,
    pub resolution: Resolution,
    pub year: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Ok,
    Missing,
    Outlier,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRow {
    pub line: usize,
    pub period: String,
    pub value: Option<f64>,
    pub status: RowStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub missing: usize,
    pub outlier: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportPreview {
    pub context: ImportContext,
    pub rows: Vec<PreviewRow>,
    pub counts: StatusCounts,
    /// Tukey fences used for outlier detection, when enough values exist.
    pub fences: Option<(f64, f64)>,
}

impl ImportPreview {
    pub fn is_clean(&self) -> bool {
        self.counts.missing == 0 && self.counts.outlier == 0 && self.counts.invalid == 0
    }
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
}

/// Q1 - k*IQR .. Q3 + k*IQR over at least four values.
fn tukey_fences(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 4 {
        return None;
    }
    let quartiles = quantile_breaks(values, 4);
    let (q1, q3) = (quartiles[1], quartiles[3]);
    let iqr = q3 - q1;
    Some((q1 - OUTLIER_FENCE * iqr, q3 + OUTLIER_FENCE * iqr))
}

pub fn preview_csv<R: Read>(reader: R, context: ImportContext) -> Result<ImportPreview> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let period_idx = find_column(&headers, &PERIOD_COLUMNS)
        .ok_or_else(|| AtlasError::invalid("Missing period column (month, period, x or date)"))?;
    let value_idx = find_column(&headers, &VALUE_COLUMNS)
        .ok_or_else(|| AtlasError::invalid("Missing value column (value, value_mwh or mwh)"))?;

    let mut rows = Vec::new();
    for (i, record) in csv_reader.records().enumerate() {
        let record = record?;
        let period = record.get(period_idx).unwrap_or_default().to_string();
        let raw = record.get(value_idx).unwrap_or_default().replace(' ', "");

        let (value, status) = if raw.is_empty() || raw == "—" || raw == "-" {
            (None, RowStatus::Missing)
        } else {
            match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => (Some(v), RowStatus::Ok),
                _ => (None, RowStatus::Invalid),
            }
        };

        rows.push(PreviewRow {
            // header is line 1
            line: i + 2,
            period,
            value,
            status,
        });
    }

    let parsed: Vec<f64> = rows.iter().filter_map(|r| r.value).collect();
    let fences = tukey_fences(&parsed);
    if let Some((low, high)) = fences {
        for row in rows.iter_mut() {
            if let Some(v) = row.value {
                if v < low || v > high {
                    row.status = RowStatus::Outlier;
                }
            }
        }
    }

    let mut counts = StatusCounts::default();
    for row in &rows {
        match row.status {
            RowStatus::Ok => counts.ok += 1,
            RowStatus::Missing => counts.missing += 1,
            RowStatus::Outlier => counts.outlier += 1,
            RowStatus::Invalid => counts.invalid += 1,
        }
    }

    Ok(ImportPreview {
        context,
        rows,
        counts,
        fences,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ImportContext {
        ImportContext {
            level: Level::Province,
            domain: Domain::Production,
            source: Some(Source::Solar),
            resolution: Resolution::Monthly,
            year: 2019,
        }
    }

    #[test]
    fn test_preview_statuses() {
        let csv = "Month,Value\n\
                   January,12345\n\
                   February,\n\
                   March,980000\n\
                   April,45678\n\
                   May,23000\n\
                   June,30100\n\
                   July,abc\n";
        let preview = preview_csv(csv.as_bytes(), context()).unwrap();

        let statuses: Vec<RowStatus> = preview.rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                RowStatus::Ok,
                RowStatus::Missing,
                RowStatus::Outlier,
                RowStatus::Ok,
                RowStatus::Ok,
                RowStatus::Ok,
                RowStatus::Invalid,
            ]
        );
        assert_eq!(preview.counts, StatusCounts { ok: 4, missing: 1, outlier: 1, invalid: 1 });
        assert_eq!(preview.rows[0].line, 2);
        assert!(!preview.is_clean());
    }

    #[test]
    fn test_preview_spaced_thousands_and_aliases() {
        let csv = "x,value_mwh\n1,12 345\n2,12 000\n";
        let preview = preview_csv(csv.as_bytes(), context()).unwrap();
        assert_eq!(preview.rows[0].value, Some(12345.0));
        assert!(preview.fences.is_none());
        assert!(preview.is_clean());
    }

    #[test]
    fn test_preview_missing_columns() {
        let err = preview_csv("foo,bar\n1,2\n".as_bytes(), context()).unwrap_err();
        assert!(matches!(err, AtlasError::InvalidArgument(_)));
    }
}
