//! Chart binding: rebuild series from the normalized result
//!
//! The first column is the category axis; every later column becomes one
//! series. With `headers` on, series display names come from the raw
//! column key (the last dot segment before a trailing `.value`); with
//! `headers` off, series inherit the chart's pre-existing names
//! positionally, and a count mismatch is a visible warning, not an error.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::binding::BindingSpec;
use crate::document::{ChartFrame, Series};
use crate::error::LookdeckError;
use crate::normalize::ResultSet;

static SERIES_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([^.]+)\.value$").unwrap());

pub fn bind_chart(
    chart: &mut ChartFrame,
    result: &ResultSet,
    spec: &BindingSpec,
) -> Result<(), LookdeckError> {
    if result.columns.len() < 2 {
        return Err(LookdeckError::Render(format!(
            "chart needs a category column and at least one series, result has {} column(s)",
            result.columns.len()
        )));
    }

    let categories: Vec<String> = (0..result.rows.len())
        .map(|row| result.cell_text(row, 0).unwrap_or_default())
        .collect();

    let series_count = result.columns.len() - 1;
    if !spec.headers() && chart.series.len() != series_count {
        warn!(
            "series count mismatch: chart has {}, result has {series_count}; \
             continuing best-effort",
            chart.series.len()
        );
    }

    let mut series = Vec::with_capacity(series_count);
    for (series_idx, col) in (1..result.columns.len()).enumerate() {
        let key = &result.columns[col].key;
        let name = if spec.headers() {
            derived_series_name(key)
        } else {
            chart
                .series
                .get(series_idx)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| key.clone())
        };

        let values: Vec<Option<f64>> = (0..result.rows.len())
            .map(|row| result.cell_number(row, col))
            .collect();

        let point_labels = spec
            .show_latest_chart_label
            .then(|| latest_label_mask(&values));

        series.push(Series {
            name,
            values,
            point_labels,
        });
    }

    chart.categories = categories;
    chart.series = series;
    Ok(())
}

/// Last dot-delimited segment before a trailing `.value`; the raw key
/// when the pattern does not match.
fn derived_series_name(key: &str) -> String {
    SERIES_NAME_RE
        .captures(key)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Show the data label only on the last point holding a value
fn latest_label_mask(values: &[Option<f64>]) -> Vec<bool> {
    let latest = values.iter().rposition(Option::is_some);
    (0..values.len()).map(|i| Some(i) == latest).collect()
}
