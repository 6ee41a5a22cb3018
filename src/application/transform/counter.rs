// Counter value extraction and formatting
use crate::domain::row::{Row, field_number};
use crate::domain::visual::CounterModel;
use crate::domain::widget::{CounterAggregation, CounterConfig};

const MISSING: &str = "—";

pub fn build_counter(rows: &[Row], config: &CounterConfig) -> CounterModel {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| field_number(row, &config.value_field))
        .collect();

    let value = match config.aggregation {
        CounterAggregation::First => values.first().copied(),
        CounterAggregation::Last => values.last().copied(),
        CounterAggregation::Sum => (!values.is_empty()).then(|| values.iter().sum::<f64>()),
        CounterAggregation::Average => {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        }
        CounterAggregation::Count => Some(rows.len() as f64),
    };

    let formatted = match value {
        Some(v) => format!(
            "{}{}{}",
            config.prefix.as_deref().unwrap_or(""),
            format_number(v, config.decimals, config.abbreviate),
            config.suffix.as_deref().unwrap_or("")
        ),
        None => MISSING.to_string(),
    };

    CounterModel { value, formatted }
}

/// `1234567.8` -> `1,234,568` (0 decimals) or `1.2M` (abbreviated).
pub fn format_number(value: f64, decimals: Option<u32>, abbreviate: bool) -> String {
    if abbreviate {
        let units = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];
        if let Some((scale, unit)) = units.iter().find(|(scale, _)| value.abs() >= *scale) {
            let digits = decimals.unwrap_or(1) as usize;
            return format!("{:.*}{}", digits, value / scale, unit);
        }
    }

    let digits = decimals.unwrap_or(if value.fract() == 0.0 { 0 } else { 2 }) as usize;
    let fixed = format!("{:.*}", digits, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed.clone(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}
