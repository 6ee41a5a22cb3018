// Chart series construction (stacked, grouped, multi-series, single)
use crate::domain::row::{Row, compare_cells, display_value, field_number, number_value};
use crate::domain::visual::{ChartModel, SeriesMode};
use crate::domain::widget::ChartConfig;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub const PALETTE: [&str; 10] = [
    "#9945FF", "#14F195", "#00C2FF", "#FF6B6B", "#FFC857", "#7E57C2", "#26A69A", "#EF6C00",
    "#5C6BC0", "#EC407A",
];

/// Fallback y-field when a config declares none.
const DEFAULT_Y_FIELD: &str = "value";

struct Palette<'a> {
    colors: Vec<&'a str>,
}

impl<'a> Palette<'a> {
    fn for_config(config: &'a ChartConfig) -> Self {
        let colors = match &config.colors {
            Some(custom) if !custom.is_empty() => custom.iter().map(String::as_str).collect(),
            _ => PALETTE.to_vec(),
        };
        Self { colors }
    }

    fn at(&self, index: usize) -> String {
        self.colors[index % self.colors.len()].to_string()
    }

    fn assign<'k>(&self, keys: impl IntoIterator<Item = &'k String>) -> BTreeMap<String, String> {
        keys.into_iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), self.at(i)))
            .collect()
    }
}

pub fn build_chart(rows: &[Row], config: &ChartConfig) -> ChartModel {
    let palette = Palette::for_config(config);
    let y_fields: Vec<String> = if config.y_fields.is_empty() {
        vec![DEFAULT_Y_FIELD.to_string()]
    } else {
        config.y_fields.clone()
    };
    let x = config.x_field.as_str();

    let mut model = if config.stacked && y_fields.len() > 1 {
        stacked_fields(rows, x, &y_fields, &palette)
    } else if let (true, Some(group_by)) = (config.stacked, config.group_by.as_deref()) {
        stacked_groups(rows, x, &y_fields[0], group_by, &palette)
    } else if y_fields.len() > 1 {
        multi_series(rows, x, &y_fields, &palette)
    } else {
        single_series(rows, x, &y_fields[0], config.distinct_colors, &palette)
    };

    model.points.sort_by(|a, b| {
        compare_cells(
            a.get(x).unwrap_or(&Value::Null),
            b.get(x).unwrap_or(&Value::Null),
        )
    });

    if model.mode == SeriesMode::Single && config.distinct_colors {
        // Colors follow the sorted axis so neighbouring bars stay distinguishable.
        let mut distinct: Vec<String> = Vec::new();
        for point in &model.points {
            let key = point.get(x).map(display_value).unwrap_or_default();
            if !distinct.contains(&key) {
                distinct.push(key);
            }
        }
        model.colors = palette.assign(&distinct);
    }

    model
}

/// Rows grouped by x value in first-appearance order.
fn group_by_x<'r>(rows: &'r [Row], x: &str) -> Vec<(Value, Vec<&'r Row>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<&Row>)> = Vec::new();
    for row in rows {
        let Some(x_value) = row.get(x) else {
            continue;
        };
        let key = display_value(x_value);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(key, groups.len());
                groups.push((x_value.clone(), vec![row]));
            }
        }
    }
    groups
}

fn sum_field(rows: &[&Row], field: &str) -> f64 {
    rows.iter().filter_map(|row| field_number(row, field)).sum()
}

fn stacked_fields(rows: &[Row], x: &str, y_fields: &[String], palette: &Palette) -> ChartModel {
    let points = group_by_x(rows, x)
        .into_iter()
        .map(|(x_value, members)| {
            let mut point = Row::new();
            point.insert(x.to_string(), x_value);
            for field in y_fields {
                point.insert(field.clone(), number_value(sum_field(&members, field)));
            }
            point
        })
        .collect();

    ChartModel {
        mode: SeriesMode::StackedFields,
        x_field: x.to_string(),
        keys: y_fields.to_vec(),
        colors: palette.assign(y_fields),
        points,
    }
}

/// Group values ranked by total descending; ties keep first appearance.
pub fn rank_groups(rows: &[Row], y: &str, group_by: &str) -> Vec<String> {
    let mut totals: Vec<(String, f64)> = Vec::new();
    for row in rows {
        let Some(group) = row.get(group_by).map(display_value) else {
            continue;
        };
        let amount = field_number(row, y).unwrap_or(0.0);
        match totals.iter_mut().find(|(g, _)| *g == group) {
            Some((_, total)) => *total += amount,
            None => totals.push((group, amount)),
        }
    }
    totals.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    totals.into_iter().map(|(group, _)| group).collect()
}

fn stacked_groups(rows: &[Row], x: &str, y: &str, group_by: &str, palette: &Palette) -> ChartModel {
    let ranked = rank_groups(rows, y, group_by);

    let points = group_by_x(rows, x)
        .into_iter()
        .map(|(x_value, members)| {
            let mut point = Row::new();
            point.insert(x.to_string(), x_value);
            for group in &ranked {
                let in_group: Vec<&Row> = members
                    .iter()
                    .copied()
                    .filter(|row| row.get(group_by).map(display_value).as_deref() == Some(group.as_str()))
                    .collect();
                point.insert(group.clone(), number_value(sum_field(&in_group, y)));
            }
            point
        })
        .collect();

    ChartModel {
        mode: SeriesMode::StackedGroups,
        x_field: x.to_string(),
        colors: palette.assign(&ranked),
        keys: ranked,
        points,
    }
}

fn multi_series(rows: &[Row], x: &str, y_fields: &[String], palette: &Palette) -> ChartModel {
    let points = rows
        .iter()
        .filter_map(|row| row.get(x).map(|x_value| (row, x_value)))
        .flat_map(move |(row, x_value)| {
            y_fields.iter().map(move |field| {
                let mut point = Row::new();
                point.insert(x.to_string(), x_value.clone());
                point.insert("series".to_string(), Value::String(field.clone()));
                point.insert(
                    "value".to_string(),
                    field_number(row, field).map(number_value).unwrap_or(Value::Null),
                );
                point
            })
        })
        .collect();

    ChartModel {
        mode: SeriesMode::MultiSeries,
        x_field: x.to_string(),
        keys: y_fields.to_vec(),
        colors: palette.assign(y_fields),
        points,
    }
}

fn single_series(rows: &[Row], x: &str, y: &str, distinct_colors: bool, palette: &Palette) -> ChartModel {
    let keys = vec![y.to_string()];
    let colors = if distinct_colors {
        BTreeMap::new()
    } else {
        palette.assign(&keys)
    };

    ChartModel {
        mode: SeriesMode::Single,
        x_field: x.to_string(),
        keys,
        colors,
        points: rows.to_vec(),
    }
}
