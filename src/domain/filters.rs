// Map filter state and its translation to backend query arguments
use super::territory::{Level, SelectedTerritory};
use serde::{Deserialize, Serialize};

/// Energy category as the backend names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Consumption,
    Production,
    FutureProduction,
}

impl Domain {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "consumption" => Some(Self::Consumption),
            "production" => Some(Self::Production),
            "future_production" | "future_potential" => Some(Self::FutureProduction),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consumption => "consumption",
            Self::Production => "production",
            Self::FutureProduction => "future_production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Annual,
    Monthly,
    Hourly,
}

impl Resolution {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "annual" => Some(Self::Annual),
            "monthly" => Some(Self::Monthly),
            "hourly" => Some(Self::Hourly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Monthly => "monthly",
            Self::Hourly => "hourly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "weekday" => Some(Self::Weekday),
            "weekend" => Some(Self::Weekend),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekday => "weekday",
            Self::Weekend => "weekend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataTheme {
    Consumption,
    Production,
    FuturePotential,
}

impl DataTheme {
    pub fn domain(&self) -> Domain {
        match self {
            Self::Consumption => Domain::Consumption,
            Self::Production => Domain::Production,
            Self::FuturePotential => Domain::FutureProduction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalResolution {
    Annual,
    Monthly,
    Daily,
    Hourly,
}

impl TemporalResolution {
    /// The map has no daily layer; daily falls back to monthly values.
    pub fn backend(&self) -> Resolution {
        match self {
            Self::Annual => Resolution::Annual,
            Self::Monthly | Self::Daily => Resolution::Monthly,
            Self::Hourly => Resolution::Hourly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOverlay {
    Heritage,
    AirQuality,
    HighAltitude,
}

/// Whether the map scale follows the selected territory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFilters {
    pub theme: DataTheme,
    pub scale: Level,
    pub time_resolution: TemporalResolution,
    #[serde(default)]
    pub overlays: Vec<ConstraintOverlay>,
    pub scale_mode: ScaleMode,
}

impl Default for MapFilters {
    fn default() -> Self {
        Self {
            theme: DataTheme::Consumption,
            scale: Level::Province,
            time_resolution: TemporalResolution::Annual,
            overlays: Vec::new(),
            scale_mode: ScaleMode::Auto,
        }
    }
}

/// One edit of the filter panel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterChange {
    SetTheme { theme: DataTheme },
    SetScale { scale: Level },
    SetTimeResolution { time_resolution: TemporalResolution },
    SetScaleMode { scale_mode: ScaleMode },
    SetOverlays { overlays: Vec<ConstraintOverlay> },
    ToggleOverlay { overlay: ConstraintOverlay },
    Reset,
}

impl MapFilters {
    pub fn set_theme(&mut self, theme: DataTheme) {
        self.theme = theme;
    }

    pub fn set_scale(&mut self, scale: Level) {
        self.scale = scale;
    }

    pub fn set_time_resolution(&mut self, time_resolution: TemporalResolution) {
        self.time_resolution = time_resolution;
    }

    pub fn set_scale_mode(&mut self, scale_mode: ScaleMode) {
        self.scale_mode = scale_mode;
    }

    pub fn set_overlays(&mut self, overlays: Vec<ConstraintOverlay>) {
        self.overlays = overlays;
    }

    pub fn toggle_overlay(&mut self, overlay: ConstraintOverlay) {
        if let Some(pos) = self.overlays.iter().position(|o| *o == overlay) {
            self.overlays.remove(pos);
        } else {
            self.overlays.push(overlay);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn apply(&mut self, change: FilterChange) {
        match change {
            FilterChange::SetTheme { theme } => self.set_theme(theme),
            FilterChange::SetScale { scale } => self.set_scale(scale),
            FilterChange::SetTimeResolution { time_resolution } => self.set_time_resolution(time_resolution),
            FilterChange::SetScaleMode { scale_mode } => self.set_scale_mode(scale_mode),
            FilterChange::SetOverlays { overlays } => self.set_overlays(overlays),
            FilterChange::ToggleOverlay { overlay } => self.toggle_overlay(overlay),
            FilterChange::Reset => self.reset(),
        }
    }

    /// In auto mode the scale tracks the selection's level.
    /// Returns true when the scale changed.
    pub fn sync_scale_to(&mut self, selection: &SelectedTerritory) -> bool {
        if self.scale_mode != ScaleMode::Auto || self.scale == selection.level {
            return false;
        }
        self.scale = selection.level;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::territory::TerritoryCodes;

    #[test]
    fn test_backend_mappings() {
        assert_eq!(DataTheme::FuturePotential.domain(), Domain::FutureProduction);
        assert_eq!(TemporalResolution::Daily.backend(), Resolution::Monthly);
        assert_eq!(TemporalResolution::Hourly.backend(), Resolution::Hourly);
        assert_eq!(Domain::parse("future_potential"), Some(Domain::FutureProduction));
        assert_eq!(Resolution::parse(" Monthly"), Some(Resolution::Monthly));
        assert_eq!(DayType::parse("holiday"), None);
    }

    #[test]
    fn test_toggle_overlay() {
        let mut filters = MapFilters::default();
        filters.toggle_overlay(ConstraintOverlay::Heritage);
        filters.toggle_overlay(ConstraintOverlay::AirQuality);
        filters.toggle_overlay(ConstraintOverlay::Heritage);
        assert_eq!(filters.overlays, vec![ConstraintOverlay::AirQuality]);

        filters.reset();
        assert_eq!(filters, MapFilters::default());
    }

    #[test]
    fn test_sync_scale_only_in_auto_mode() {
        let selection = SelectedTerritory {
            level: Level::Comune,
            name: "Torino".into(),
            codes: TerritoryCodes { reg: 1, prov: Some(1), mun: Some(1272) },
            parent: None,
        };

        let mut filters = MapFilters::default();
        assert!(filters.sync_scale_to(&selection));
        assert_eq!(filters.scale, Level::Comune);
        assert!(!filters.sync_scale_to(&selection));

        let mut manual = MapFilters::default();
        manual.set_scale_mode(ScaleMode::Manual);
        assert!(!manual.sync_scale_to(&selection));
        assert_eq!(manual.scale, Level::Province);
    }

    #[test]
    fn test_filters_json_uses_ui_labels() {
        let json = r#"{"theme":"future_potential","scale":"municipality","time_resolution":"daily","scale_mode":"manual"}"#;
        let filters: MapFilters = serde_json::from_str(json).unwrap();
        assert_eq!(filters.scale, Level::Comune);
        assert!(filters.overlays.is_empty());
        assert_eq!(filters.theme.domain(), Domain::FutureProduction);
    }

    #[test]
    fn test_apply_changes_from_json() {
        let mut filters = MapFilters::default();
        let changes: Vec<FilterChange> = serde_json::from_str(
            r#"[
                {"op": "set_theme", "theme": "future_potential"},
                {"op": "set_time_resolution", "time_resolution": "daily"},
                {"op": "toggle_overlay", "overlay": "air_quality"},
                {"op": "set_scale", "scale": "region"}
            ]"#,
        )
        .unwrap();
        for change in changes {
            filters.apply(change);
        }
        assert_eq!(filters.theme, DataTheme::FuturePotential);
        assert_eq!(filters.time_resolution, TemporalResolution::Daily);
        assert_eq!(filters.overlays, vec![ConstraintOverlay::AirQuality]);
        assert_eq!(filters.scale, Level::Region);

        filters.apply(FilterChange::Reset);
        assert_eq!(filters, MapFilters::default());
    }
}
