// Presentation models produced by the transform pipeline
use serde::Serialize;
use std::collections::BTreeMap;

use super::row::Row;

/// Which series-construction branch produced a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SeriesMode {
    StackedFields,
    StackedGroups,
    MultiSeries,
    Single,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartModel {
    pub mode: SeriesMode,
    pub x_field: String,
    /// Series keys in stacking/legend order.
    pub keys: Vec<String>,
    pub colors: BTreeMap<String, String>,
    pub points: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnHeader {
    pub key: String,
    pub label: String,
}

impl ColumnHeader {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableModel {
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<Row>,
}

/// One page of a filtered table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePage {
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<Row>,
    pub page: usize,
    pub page_count: usize,
    pub total_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterModel {
    pub value: Option<f64>,
    pub formatted: String,
}

/// Transformed data for any widget kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WidgetModel {
    Chart(ChartModel),
    Table(TableModel),
    Counter(CounterModel),
}
