// Widget configuration domain model (charts, counters, tables)
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// The three kinds of persisted widget configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Charts,
    Counters,
    Tables,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Charts, Self::Counters, Self::Tables];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Charts => "charts",
            Self::Counters => "counters",
            Self::Tables => "tables",
        }
    }

    /// Key of the cached configs for one page, e.g. `tables_page_dashboard`.
    pub fn page_key(&self, page_id: &str) -> String {
        format!("{}_page_{}", self.as_str(), page_id)
    }

    /// Key of one cached config, e.g. `charts_item_volume`.
    pub fn item_key(&self, id: &str) -> String {
        format!("{}_item_{}", self.as_str(), id)
    }

    /// Key of the full local snapshot of this kind, e.g. `all_counters`.
    pub fn snapshot_key(&self) -> String {
        format!("all_{}", self.as_str())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "charts" | "chart" => Ok(Self::Charts),
            "counters" | "counter" => Ok(Self::Counters),
            "tables" | "table" => Ok(Self::Tables),
            other => Err(format!("unknown resource kind: {}", other)),
        }
    }
}

/// Where a widget's rows come from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataRequest {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Area,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    pub id: String,
    pub title: String,
    pub page: String,
    #[serde(default)]
    pub width: Option<u32>,
    pub api_endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub chart_type: ChartType,
    pub x_field: String,
    #[serde(default, alias = "yField", deserialize_with = "one_or_many")]
    pub y_fields: Vec<String>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub stacked: bool,
    #[serde(default)]
    pub distinct_colors: bool,
    #[serde(default)]
    pub colors: Option<Vec<String>>,
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Average,
    Difference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedColumn {
    pub name: String,
    pub source_columns: Vec<String>,
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub field: String,
    #[serde(default)]
    pub header: Option<String>,
}

impl TableColumn {
    pub fn label(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.field)
    }
}

fn default_rows_per_page() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    pub id: String,
    pub title: String,
    pub page: String,
    #[serde(default)]
    pub width: Option<u32>,
    pub api_endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub default_sort_direction: SortDirection,
    #[serde(default)]
    pub computed_columns: Vec<ComputedColumn>,
    #[serde(default = "default_rows_per_page")]
    pub rows_per_page: usize,
    #[serde(default)]
    pub time_field: Option<String>,
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterAggregation {
    #[default]
    First,
    Last,
    Sum,
    Average,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterConfig {
    pub id: String,
    pub title: String,
    pub page: String,
    #[serde(default)]
    pub width: Option<u32>,
    pub api_endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub value_field: String,
    #[serde(default)]
    pub aggregation: CounterAggregation,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub abbreviate: bool,
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
}

/// Any persisted widget configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WidgetConfig {
    Chart(ChartConfig),
    Counter(CounterConfig),
    Table(TableConfig),
}

macro_rules! common_field {
    ($self:ident, $field:ident) => {
        match $self {
            WidgetConfig::Chart(c) => &c.$field,
            WidgetConfig::Counter(c) => &c.$field,
            WidgetConfig::Table(c) => &c.$field,
        }
    };
}

impl WidgetConfig {
    /// Decode a config body whose kind is known from the route it came from.
    pub fn from_value(kind: ResourceKind, value: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            ResourceKind::Charts => Self::Chart(serde_json::from_value(value)?),
            ResourceKind::Counters => Self::Counter(serde_json::from_value(value)?),
            ResourceKind::Tables => Self::Table(serde_json::from_value(value)?),
        })
    }

    /// Encode without the `kind` tag, the shape the persistence API stores.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Self::Chart(c) => serde_json::to_value(c),
            Self::Counter(c) => serde_json::to_value(c),
            Self::Table(c) => serde_json::to_value(c),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Chart(_) => ResourceKind::Charts,
            Self::Counter(_) => ResourceKind::Counters,
            Self::Table(_) => ResourceKind::Tables,
        }
    }

    pub fn id(&self) -> &str {
        common_field!(self, id)
    }

    pub fn title(&self) -> &str {
        common_field!(self, title)
    }

    pub fn page(&self) -> &str {
        common_field!(self, page)
    }

    pub fn refresh_interval_secs(&self) -> Option<u64> {
        *common_field!(self, refresh_interval_secs)
    }

    pub fn data_request(&self) -> DataRequest {
        DataRequest {
            endpoint: common_field!(self, api_endpoint).clone(),
            api_key: common_field!(self, api_key).clone(),
            parameters: common_field!(self, parameters).clone(),
        }
    }
}

/// Accept `"yFields": "volume"` as well as `"yFields": ["a", "b"]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}
