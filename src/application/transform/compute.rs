// Computed columns (sum / average / difference over source fields)
use crate::domain::row::{Row, as_number, number_value};
use crate::domain::widget::{Aggregation, ComputedColumn};
use serde_json::Value;

/// Aggregate the included source values.
///
/// `difference` is the first value minus the sum of the rest, so it depends
/// on the order of `sourceColumns`.
pub fn aggregate(aggregation: Aggregation, values: &[f64]) -> Option<f64> {
    let (first, rest) = values.split_first()?;
    let total: f64 = values.iter().sum();
    Some(match aggregation {
        Aggregation::Sum => total,
        Aggregation::Average => total / values.len() as f64,
        Aggregation::Difference => first - rest.iter().sum::<f64>(),
    })
}

/// Value of a computed column for one row; non-numeric sources are excluded.
pub fn computed_value(row: &Row, column: &ComputedColumn) -> Value {
    let values: Vec<f64> = column
        .source_columns
        .iter()
        .filter_map(|field| row.get(field).and_then(as_number))
        .collect();
    aggregate(column.aggregation, &values)
        .map(number_value)
        .unwrap_or(Value::Null)
}
