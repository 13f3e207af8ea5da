// Choropleth service - one-shot and progressive (streamed) map building
use crate::application::energy_api::EnergyApi;
use crate::application::geo_pipeline::{values_by_code, GeoArgs};
use crate::domain::choropleth::{colorize, color_for_value, legend, LegendEntry, Palette};
use crate::domain::territory::Level;
use crate::error::{AtlasError, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

const STREAM_BUFFER: usize = 8;

/// Merged, coloured FeatureCollection for one set of map filters.
#[derive(Debug, Clone, Serialize)]
pub struct Choropleth {
    pub level: Level,
    pub geo: Value,
    pub breaks: Vec<f64>,
    pub legend: Vec<LegendEntry>,
    pub features: usize,
    pub values_mapped: usize,
}

/// Chunks of a progressive map load, in the order they are sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Geometry with every feature in the pending colour.
    Skeleton { level: Level, geo: Value },
    /// Per-code values and colours to apply over the skeleton.
    Values {
        values: BTreeMap<i64, f64>,
        colors: BTreeMap<i64, String>,
        breaks: Vec<f64>,
        legend: Vec<LegendEntry>,
    },
    Error { message: String },
    Complete {
        features: usize,
        values_mapped: usize,
        duration_ms: i64,
        completed_at: String,
    },
}

fn feature_count(geo: &Value) -> usize {
    geo.get("features").and_then(Value::as_array).map_or(0, Vec::len)
}

fn parse_level(args: &GeoArgs) -> Result<Level> {
    Level::parse(&args.level).ok_or_else(|| AtlasError::invalid(format!("Invalid level: {}", args.level)))
}

#[derive(Clone)]
pub struct ChoroplethService {
    api: Arc<dyn EnergyApi>,
    palette: Palette,
}

impl ChoroplethService {
    pub fn new(api: Arc<dyn EnergyApi>, palette: Palette) -> Self {
        Self { api, palette }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub async fn build(&self, args: &GeoArgs) -> Result<Choropleth> {
        let level = parse_level(args)?;
        let query = args.values_query(level);

        let (mut geo, rows) = futures::future::try_join(
            self.api.territories(level, level.default_simplify()),
            self.api.values(&query),
        )
        .await?;

        let values = values_by_code(&rows, level);
        let samples: Vec<f64> = values.values().copied().collect();
        let breaks = self.palette.breaks(&samples);
        colorize(&mut geo, level, &values, &breaks, &self.palette);

        Ok(Choropleth {
            level,
            features: feature_count(&geo),
            values_mapped: values.len(),
            legend: legend(&breaks, &self.palette.colors),
            breaks,
            geo,
        })
    }

    /// Sends the geometry first, then values and colours, then a completion
    /// chunk. Stops early once the receiver is dropped.
    pub fn stream(&self, args: GeoArgs) -> Result<mpsc::Receiver<StreamMessage>> {
        let level = parse_level(&args)?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let api = self.api.clone();
        let palette = self.palette.clone();
        let start_time = Instant::now();

        tokio::spawn(async move {
            let mut geo = match api.territories(level, level.default_simplify()).await {
                Ok(geo) => geo,
                Err(e) => {
                    tracing::error!("Streamed map geometry failed: {}", e);
                    let _ = tx.send(StreamMessage::Error { message: e.to_string() }).await;
                    return;
                }
            };
            let features = feature_count(&geo);
            colorize(&mut geo, level, &Default::default(), &[], &palette);
            if tx.send(StreamMessage::Skeleton { level, geo }).await.is_err() {
                tracing::debug!("Map stream receiver dropped after skeleton");
                return;
            }

            let rows = match api.values(&args.values_query(level)).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!("Streamed map values failed: {}", e);
                    let _ = tx.send(StreamMessage::Error { message: e.to_string() }).await;
                    return;
                }
            };

            let values: BTreeMap<i64, f64> = values_by_code(&rows, level).into_iter().collect();
            let samples: Vec<f64> = values.values().copied().collect();
            let breaks = palette.breaks(&samples);
            let colors = values
                .iter()
                .map(|(code, v)| (*code, color_for_value(Some(*v), &breaks, &palette.colors).to_string()))
                .collect();
            let values_mapped = values.len();

            let update = StreamMessage::Values {
                values,
                colors,
                legend: legend(&breaks, &palette.colors),
                breaks,
            };
            if tx.send(update).await.is_err() {
                return;
            }

            let complete = StreamMessage::Complete {
                features,
                values_mapped,
                duration_ms: start_time.elapsed().as_millis() as i64,
                completed_at: Utc::now().to_rfc3339(),
            };
            let _ = tx.send(complete).await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::geo_pipeline::tests::stub;
    use crate::domain::choropleth::PENDING_COLOR;
    use crate::domain::filters::{Domain, Resolution};

    fn args(level: &str) -> GeoArgs {
        GeoArgs {
            level: level.to_string(),
            domain: Domain::Production,
            resolution: Resolution::Annual,
            year: 2019,
            scenario: "0".into(),
            base_group: Some("solar".into()),
        }
    }

    fn service() -> ChoroplethService {
        ChoroplethService::new(Arc::new(stub()), Palette::default())
    }

    #[tokio::test]
    async fn test_build_colours_every_feature() {
        let map = service().build(&args("region")).await.unwrap();
        assert_eq!(map.level, Level::Region);
        assert_eq!(map.features, 2);
        assert_eq!(map.values_mapped, 2);
        assert_eq!(map.legend.len(), 6);
        for feature in map.geo["features"].as_array().unwrap() {
            assert!(feature["properties"]["fill_color"].as_str().unwrap().starts_with('#'));
            assert!(feature["properties"]["value_mwh"].is_number());
        }
    }

    #[tokio::test]
    async fn test_invalid_level_is_rejected() {
        let err = service().build(&args("nation")).await.unwrap_err();
        assert!(matches!(err, AtlasError::InvalidArgument(_)));
        assert!(service().stream(args("")).is_err());
    }

    #[tokio::test]
    async fn test_stream_order() {
        let mut rx = service().stream(args("province")).unwrap();
        let mut messages = Vec::new();
        while let Some(msg) = rx.recv().await {
            messages.push(msg);
        }
        assert_eq!(messages.len(), 3);

        match &messages[0] {
            StreamMessage::Skeleton { geo, .. } => {
                assert_eq!(geo["features"][0]["properties"]["fill_color"], PENDING_COLOR);
            }
            other => panic!("expected skeleton, got {other:?}"),
        }
        match &messages[1] {
            StreamMessage::Values { colors, values, .. } => {
                assert_eq!(values.len(), 3);
                assert_eq!(colors[&3], "#800026");
            }
            other => panic!("expected values, got {other:?}"),
        }
        assert!(matches!(
            messages[2],
            StreamMessage::Complete { features: 3, values_mapped: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_stream_reports_upstream_failure() {
        let mut broken = stub();
        broken.fail_values = true;
        let service = ChoroplethService::new(Arc::new(broken), Palette::default());

        let mut rx = service.stream(args("region")).unwrap();
        assert!(matches!(rx.recv().await, Some(StreamMessage::Skeleton { .. })));
        assert!(matches!(rx.recv().await, Some(StreamMessage::Error { .. })));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_message_json_is_tagged() {
        let json = serde_json::to_value(StreamMessage::Error { message: "boom".into() }).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }
}
