// Raw rows returned by analytics APIs
use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::period;

/// One untyped record as returned by an external API. Field order is preserved.
pub type Row = Map<String, Value>;

/// Coerce a cell to a number.
///
/// Numbers pass through; strings are accepted after stripping currency
/// symbols, thousands separators and percent signs. Anything else is excluded.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

/// Same as [`as_number`] but for a named field of a row.
pub fn field_number(row: &Row, field: &str) -> Option<f64> {
    row.get(field).and_then(as_number)
}

fn parse_numeric_str(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | ' ' | '€' | '£'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// True when the string looks like a plain or currency-formatted number.
pub fn is_numeric_str(raw: &str) -> bool {
    parse_numeric_str(raw).is_some()
}

/// Render a cell as text for headers, grouping keys and search.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Wrap an `f64` as a JSON number, mapping non-finite results to `null`.
pub fn number_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Ordering used for every axis and period sort: numbers numerically,
/// everything else through the period comparison.
pub fn compare_cells(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => period::compare_periods(&display_value(a), &display_value(b)),
    }
}
