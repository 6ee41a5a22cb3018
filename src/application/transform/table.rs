// Table shaping - vertical projection, horizontal pivot, search and paging
use crate::application::transform::compute::{aggregate, computed_value};
use crate::domain::period::{self, SAMPLE_SIZE};
use crate::domain::row::{Row, as_number, compare_cells, display_value, is_numeric_str, number_value};
use crate::domain::visual::{ColumnHeader, TableModel, TablePage};
use crate::domain::widget::{ComputedColumn, Orientation, SortDirection, TableConfig};
use serde_json::Value;
use std::collections::HashSet;

/// Key holding the metric name in pivoted rows.
pub const METRIC_KEY: &str = "metric";

pub fn build_table(rows: &[Row], config: &TableConfig) -> TableModel {
    match config.orientation {
        Orientation::Vertical => vertical(rows, config),
        Orientation::Horizontal => horizontal(rows, config),
    }
}

fn column_fields(rows: &[Row], config: &TableConfig) -> Vec<String> {
    if !config.columns.is_empty() {
        return config.columns.iter().map(|c| c.field.clone()).collect();
    }
    rows.first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

fn column_label(config: &TableConfig, field: &str) -> String {
    config
        .columns
        .iter()
        .find(|c| c.field == field)
        .map(|c| c.label().to_string())
        .unwrap_or_else(|| field.to_string())
}

/// Find the field holding the time period: the configured one, then by
/// name, then by sampling string values of the leading rows.
pub fn detect_time_field(rows: &[Row], candidates: &[String], configured: Option<&str>) -> Option<String> {
    if let Some(field) = configured.filter(|f| !f.is_empty()) {
        return Some(field.to_string());
    }

    if let Some(field) = candidates.iter().find(|c| period::is_time_field_name(c)) {
        return Some(field.clone());
    }

    candidates
        .iter()
        .find(|field| {
            let sample: Vec<&str> = rows
                .iter()
                .take(SAMPLE_SIZE)
                .filter_map(|row| row.get(field.as_str()).and_then(Value::as_str))
                .collect();
            !sample.is_empty() && period::classify_values(sample).is_some()
        })
        .cloned()
}

fn sort_rows_by(rows: &mut [Row], field: &str, direction: SortDirection) {
    rows.sort_by(|a, b| {
        compare_cells(
            a.get(field).unwrap_or(&Value::Null),
            b.get(field).unwrap_or(&Value::Null),
        )
    });
    if direction == SortDirection::Desc {
        rows.reverse();
    }
}

fn vertical(rows: &[Row], config: &TableConfig) -> TableModel {
    let fields = column_fields(rows, config);
    let mut model = project(rows, &fields, config);

    if let Some(time_field) = detect_time_field(rows, &fields, config.time_field.as_deref()) {
        sort_rows_by(&mut model.rows, &time_field, config.default_sort_direction);
    }
    model
}

/// Rows restricted to `fields`, with computed columns appended.
fn project(rows: &[Row], fields: &[String], config: &TableConfig) -> TableModel {
    let mut columns: Vec<ColumnHeader> = fields
        .iter()
        .map(|f| ColumnHeader::new(f.clone(), column_label(config, f)))
        .collect();
    columns.extend(
        config
            .computed_columns
            .iter()
            .map(|c| ColumnHeader::new(c.name.clone(), c.name.clone())),
    );

    let projected = rows
        .iter()
        .map(|row| {
            let mut out = Row::new();
            for field in fields {
                out.insert(field.clone(), row.get(field).cloned().unwrap_or(Value::Null));
            }
            for column in &config.computed_columns {
                out.insert(column.name.clone(), computed_value(row, column));
            }
            out
        })
        .collect();

    TableModel {
        columns,
        rows: projected,
    }
}

fn horizontal(rows: &[Row], config: &TableConfig) -> TableModel {
    let fields = column_fields(rows, config);
    let candidates: Vec<String> = if config.columns.is_empty() {
        fields.clone()
    } else {
        // The period field is usually not one of the displayed columns.
        rows.first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_else(|| fields.clone())
    };

    if let Some(time_field) = detect_time_field(rows, &candidates, config.time_field.as_deref()) {
        let metrics: Vec<String> = fields.into_iter().filter(|f| *f != time_field).collect();
        let mut model = pivot(rows, &metrics, &time_field, config.default_sort_direction);
        append_computed_rows(&mut model, &config.computed_columns);
        return model;
    }

    if numeric_column_count(rows, &fields) >= 2 {
        tracing::debug!("Table {} looks like long-format financial data, keeping rows", config.id);
        return project(rows, &fields, config);
    }

    tracing::debug!("Table {} has no period field, transposing on first column", config.id);
    let mut model = transpose_on_first_column(rows, &fields);
    append_computed_rows(&mut model, &config.computed_columns);
    model
}

/// One row per metric, one column per distinct period.
pub fn pivot(rows: &[Row], metrics: &[String], time_field: &str, direction: SortDirection) -> TableModel {
    let mut seen = HashSet::new();
    let mut periods: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get(time_field))
        .map(display_value)
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect();
    periods.sort_by(|a, b| period::compare_periods(a, b));
    if direction == SortDirection::Desc {
        periods.reverse();
    }

    let pivoted = metrics
        .iter()
        .map(|metric| {
            let mut out = Row::new();
            out.insert(METRIC_KEY.to_string(), Value::String(metric.clone()));
            for p in &periods {
                let cell = rows
                    .iter()
                    .find(|row| row.get(time_field).map(display_value).as_deref() == Some(p.as_str()))
                    .and_then(|row| row.get(metric))
                    .cloned()
                    .unwrap_or(Value::Null);
                out.insert(p.clone(), cell);
            }
            out
        })
        .collect();

    let mut columns = vec![ColumnHeader::new(METRIC_KEY, "Metric")];
    columns.extend(
        periods
            .iter()
            .map(|p| ColumnHeader::new(p.clone(), period::format_period(p))),
    );

    TableModel {
        columns,
        rows: pivoted,
    }
}

fn numeric_column_count(rows: &[Row], fields: &[String]) -> usize {
    fields
        .iter()
        .filter(|field| {
            let sample: Vec<&Value> = rows
                .iter()
                .take(SAMPLE_SIZE)
                .filter_map(|row| row.get(field.as_str()))
                .filter(|v| !v.is_null())
                .collect();
            !sample.is_empty()
                && sample.iter().all(|v| match v {
                    Value::Number(_) => true,
                    Value::String(s) => is_numeric_str(s),
                    _ => false,
                })
        })
        .count()
}

fn transpose_on_first_column(rows: &[Row], fields: &[String]) -> TableModel {
    let Some((id_field, rest)) = fields.split_first() else {
        return TableModel {
            columns: Vec::new(),
            rows: Vec::new(),
        };
    };

    let ids: Vec<String> = rows
        .iter()
        .map(|row| row.get(id_field).map(display_value).unwrap_or_default())
        .collect();

    let transposed = rest
        .iter()
        .map(|field| {
            let mut out = Row::new();
            out.insert(METRIC_KEY.to_string(), Value::String(field.clone()));
            for (id, row) in ids.iter().zip(rows) {
                out.entry(id.clone())
                    .or_insert_with(|| row.get(field).cloned().unwrap_or(Value::Null));
            }
            out
        })
        .collect();

    let mut columns = vec![ColumnHeader::new(METRIC_KEY, id_field.clone())];
    let mut seen = HashSet::new();
    columns.extend(
        ids.iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| ColumnHeader::new(id.clone(), id.clone())),
    );

    TableModel {
        columns,
        rows: transposed,
    }
}

/// Synthesize one row per computed column from the pivoted metric rows.
fn append_computed_rows(model: &mut TableModel, computed: &[ComputedColumn]) {
    let period_keys: Vec<String> = model
        .columns
        .iter()
        .filter(|c| c.key != METRIC_KEY)
        .map(|c| c.key.clone())
        .collect();

    for column in computed {
        let mut out = Row::new();
        out.insert(METRIC_KEY.to_string(), Value::String(column.name.clone()));
        for key in &period_keys {
            let values: Vec<f64> = column
                .source_columns
                .iter()
                .filter_map(|source| {
                    model
                        .rows
                        .iter()
                        .find(|row| row.get(METRIC_KEY).and_then(Value::as_str) == Some(source.as_str()))
                        .and_then(|row| row.get(key))
                        .and_then(as_number)
                })
                .collect();
            let cell = aggregate(column.aggregation, &values)
                .map(number_value)
                .unwrap_or(Value::Null);
            out.insert(key.clone(), cell);
        }
        model.rows.push(out);
    }
}

/// Rows whose visible or computed values contain `query`, ignoring case.
pub fn filter_rows<'a>(model: &'a TableModel, query: &str) -> Vec<&'a Row> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return model.rows.iter().collect();
    }

    model
        .rows
        .iter()
        .filter(|row| {
            model.columns.iter().any(|c| {
                row.get(&c.key)
                    .map(|v| display_value(v).to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
        })
        .collect()
}

/// 1-based page of the filtered rows; out-of-range pages clamp.
pub fn paginate(model: &TableModel, query: &str, page: usize, rows_per_page: usize) -> TablePage {
    let filtered = filter_rows(model, query);
    let total_rows = filtered.len();
    let per_page = if rows_per_page == 0 { total_rows.max(1) } else { rows_per_page };
    let page_count = total_rows.div_ceil(per_page);
    let page = page.clamp(1, page_count.max(1));

    let rows = filtered
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .cloned()
        .collect();

    TablePage {
        columns: model.columns.clone(),
        rows,
        page,
        page_count,
        total_rows,
    }
}
