use serde::{Deserialize, Serialize};

/// Closed set of incident tiers. Wire names are camelCase (`doubleBlack`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Green,
    Blue,
    Black,
    DoubleBlack,
    TerrainPark,
}

impl Category {
    /// All tiers, easiest first.
    pub const ALL: [Category; 5] = [
        Category::Green,
        Category::Blue,
        Category::Black,
        Category::DoubleBlack,
        Category::TerrainPark,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Green => "green",
            Category::Blue => "blue",
            Category::Black => "black",
            Category::DoubleBlack => "doubleBlack",
            Category::TerrainPark => "terrainPark",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Green => "Green Circle",
            Category::Blue => "Blue Square",
            Category::Black => "Black Diamond",
            Category::DoubleBlack => "Double Black Diamond",
            Category::TerrainPark => "Terrain Park",
        }
    }

    /// Exact match on the wire name. No case folding or fuzzy matching.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryOption {
    pub value: Category,
    pub label: &'static str,
}

pub fn category_options() -> Vec<CategoryOption> {
    Category::ALL
        .into_iter()
        .map(|value| CategoryOption {
            value,
            label: value.label(),
        })
        .collect()
}

/// One recorded incident.
///
/// Notes:
/// - `id` and `timestamp` are assigned once at creation and never change.
/// - `details` is trimmed and non-empty.
/// - Optional labels are either trimmed non-empty strings or absent; absent fields are omitted
///   from the serialized form rather than written as `null` or `""`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IncidentEntry {
    pub id: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub details: String,
}

/// Raw caller input for a new incident, before validation.
///
/// Legacy field names (`resort`, `run`, `runDifficulty`) are accepted as aliases.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IncidentForm {
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default, alias = "resort")]
    pub location: Option<String>,
    #[serde(default, alias = "run")]
    pub sub_location: Option<String>,
    #[serde(default, alias = "runDifficulty")]
    pub category: Option<String>,
}

impl IncidentForm {
    pub fn with_details(details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::default()
        }
    }
}

/// Last reset time plus the incident log, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub last_reset_timestamp: Option<String>,
    pub log: Vec<IncidentEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStatus {
    pub days_elapsed: i64,
    pub last_reset_timestamp: Option<String>,
    pub latest_entry: Option<IncidentEntry>,
    pub log: Vec<IncidentEntry>,
}

impl LedgerStatus {
    pub fn empty() -> Self {
        Self {
            days_elapsed: 0,
            last_reset_timestamp: None,
            latest_entry: None,
            log: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordedIncident {
    pub days_elapsed: i64,
    pub last_reset_timestamp: String,
    pub latest_entry: IncidentEntry,
}
