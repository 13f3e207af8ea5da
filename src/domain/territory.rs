// Territory levels, selection and the searchable territory index
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_SEARCH_LIMIT: usize = 8;

/// Administrative level as the energy backend names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Region,
    Province,
    #[serde(alias = "municipality")]
    Comune,
}

impl Level {
    /// Accepts backend names and the "municipality" UI label.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "region" => Some(Self::Region),
            "province" => Some(Self::Province),
            "comune" | "municipality" => Some(Self::Comune),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Province => "province",
            Self::Comune => "comune",
        }
    }

    /// Query parameter carrying a territory code at this level.
    pub fn code_param(&self) -> &'static str {
        match self {
            Self::Region => "region_code",
            Self::Province => "province_code",
            Self::Comune => "comune_code",
        }
    }

    pub fn default_simplify(&self) -> f64 {
        match self {
            Self::Region => 0.02,
            Self::Province => 0.005,
            Self::Comune => 0.01,
        }
    }

    pub fn name_label(&self) -> &'static str {
        match self {
            Self::Region => "Region",
            Self::Province => "Province",
            Self::Comune => "Municipality",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryCodes {
    pub reg: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prov: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mun: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryParent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedTerritory {
    pub level: Level,
    pub name: String,
    pub codes: TerritoryCodes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TerritoryParent>,
}

impl SelectedTerritory {
    /// Code of the territory at its own level.
    pub fn code(&self) -> Option<i64> {
        match self.level {
            Level::Region => Some(self.codes.reg),
            Level::Province => self.codes.prov,
            Level::Comune => self.codes.mun,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryIndexRow {
    pub id: String,
    pub level: Level,
    pub name: String,
    pub codes: TerritoryCodes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TerritoryParent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchHints>,
}

impl TerritoryIndexRow {
    pub fn to_selection(&self) -> SelectedTerritory {
        SelectedTerritory {
            level: self.level,
            name: self.name.clone(),
            codes: self.codes,
            parent: self.parent.clone(),
        }
    }

    fn haystack(&self) -> BTreeSet<String> {
        let mut list = BTreeSet::new();
        list.insert(normalize(&self.name));
        if let Some(hints) = &self.search {
            if let Some(n) = &hints.normalized {
                list.insert(normalize(n));
            }
            for alias in &hints.aliases {
                list.insert(normalize(alias));
            }
        }
        list
    }
}

/// Case and accent insensitive form used for matching.
pub fn normalize(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Dropdown subtitle, e.g. "Province · Piemonte".
pub fn format_meta(row: &TerritoryIndexRow) -> String {
    let label = row.level.name_label();
    let parent = row.parent.clone().unwrap_or_default();
    match row.level {
        Level::Region => label.to_string(),
        Level::Province => format!("{} · {}", label, parent.region.unwrap_or_default())
            .trim()
            .to_string(),
        Level::Comune => match (parent.province, parent.region) {
            (Some(prov), Some(reg)) => format!("{} · {}, {}", label, prov, reg),
            (None, Some(reg)) => format!("{} · {}", label, reg),
            _ => label.to_string(),
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct TerritoryIndex {
    rows: Vec<TerritoryIndexRow>,
}

impl TerritoryIndex {
    pub fn new(rows: Vec<TerritoryIndexRow>) -> Self {
        Self { rows }
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::from_slice(bytes)?))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_json(&bytes)?)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn find(&self, level: Level, code: i64) -> Option<&TerritoryIndexRow> {
        self.rows.iter().find(|row| {
            row.level == level
                && match level {
                    Level::Region => row.codes.reg == code,
                    Level::Province => row.codes.prov == Some(code),
                    Level::Comune => row.codes.mun == Some(code),
                }
        })
    }

    /// Prefix matches first, then substring matches, each ordered by name.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&TerritoryIndexRow> {
        let q = normalize(query);
        if q.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<(bool, &TerritoryIndexRow)> = self
            .rows
            .iter()
            .filter_map(|row| {
                let hay = row.haystack();
                if hay.iter().any(|h| h.starts_with(&q)) {
                    Some((true, row))
                } else if hay.iter().any(|h| h.contains(&q)) {
                    Some((false, row))
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|(a_starts, a), (b_starts, b)| {
            b_starts
                .cmp(a_starts)
                .then_with(|| normalize(&a.name).cmp(&normalize(&b.name)))
                .then_with(|| a.name.cmp(&b.name))
        });

        matches.into_iter().take(limit).map(|(_, row)| row).collect()
    }
}
