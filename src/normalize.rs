//! Result normalization
//!
//! Converts one raw `json_bi` payload (field metadata plus rows) into a
//! labeled tabular structure: ordered columns with human display labels,
//! rows as ordered cell sequences, missing values normalized to empty.
//! Pure and deterministic for a given raw input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One labeled column of a normalized result
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Raw flattened field key, e.g. `orders.count.value`
    pub key: String,
    /// Display label: metadata name, lower-cased and whitespace-normalized
    pub label: String,
}

/// Labeled tabular result shared read-only by every consuming element
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Value> {
        self.rows.get(row)?.get(col)
    }

    /// Cell as display text; missing and null cells are empty strings
    pub fn cell_text(&self, row: usize, col: usize) -> Option<String> {
        self.cell(row, col).map(display)
    }

    /// Cell as a number, for chart series values
    pub fn cell_number(&self, row: usize, col: usize) -> Option<f64> {
        match self.cell(row, col)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Resolve a selector against key, display label or positional index
    pub fn column_index(&self, selector: &str) -> Option<usize> {
        if let Some(idx) = self
            .columns
            .iter()
            .position(|c| c.key == selector || c.label.eq_ignore_ascii_case(selector))
        {
            return Some(idx);
        }
        let idx: usize = selector.trim().parse().ok()?;
        (idx < self.columns.len()).then_some(idx)
    }
}

/// Cell value as user-facing text
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Normalize one raw `json_bi` payload.
pub fn normalize(raw: &Value) -> ResultSet {
    let fields = metadata_fields(raw);

    let flattened: Vec<Vec<(String, Value)>> = raw
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().map(flatten_row).collect())
        .unwrap_or_default();

    // Union of row keys, first-seen order across rows.
    let mut seen: Vec<String> = Vec::new();
    for row in &flattened {
        for (key, _) in row {
            if !seen.iter().any(|k| k == key) {
                seen.push(key.clone());
            }
        }
    }

    // Metadata field order first, leftovers after.
    let mut ordered: Vec<String> = Vec::new();
    for (name, _) in &fields {
        for key in &seen {
            if belongs_to(key, name) && !ordered.contains(key) {
                ordered.push(key.clone());
            }
        }
    }
    for key in &seen {
        if !ordered.contains(key) {
            ordered.push(key.clone());
        }
    }

    let columns: Vec<Column> = ordered
        .iter()
        .map(|key| Column {
            key: key.clone(),
            label: label_for(key, &fields),
        })
        .collect();

    let rows: Vec<Vec<Value>> = flattened
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| {
                    row.iter()
                        .find(|(k, _)| k == &col.key)
                        .map(|(_, v)| match v {
                            Value::Null => Value::String(String::new()),
                            other => other.clone(),
                        })
                        .unwrap_or_else(|| Value::String(String::new()))
                })
                .collect()
        })
        .collect();

    ResultSet { columns, rows }
}

/// Ordered (name, label) pairs from the payload's field metadata
fn metadata_fields(raw: &Value) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    let Some(meta) = raw.get("metadata").and_then(|m| m.get("fields")) else {
        return fields;
    };
    for section in ["dimensions", "measures", "table_calculations"] {
        let Some(items) = meta.get(section).and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            let Some(name) = item.get("name").and_then(Value::as_str) else {
                continue;
            };
            let label = item
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string();
            fields.push((name.to_string(), label));
        }
    }
    fields
}

fn belongs_to(key: &str, field_name: &str) -> bool {
    key == field_name || key.starts_with(&format!("{field_name}."))
}

/// Map a flattened key through the field metadata's display name. Pivot
/// segments between the field name and the `.value` suffix are appended.
fn label_for(key: &str, fields: &[(String, String)]) -> String {
    for (name, label) in fields {
        if belongs_to(key, name) {
            let mid = key
                .strip_prefix(name.as_str())
                .unwrap_or("")
                .trim_matches('.')
                .trim_end_matches("value")
                .trim_matches('.');
            let full = if mid.is_empty() {
                label.clone()
            } else {
                format!("{label} {}", mid.replace('.', " "))
            };
            return normalize_label(&full);
        }
    }
    normalize_label(key)
}

fn normalize_label(label: &str) -> String {
    WS_RE.replace_all(label.trim(), " ").to_lowercase()
}

/// Flatten one row object into dotted (key, leaf) pairs
fn flatten_row(row: &Value) -> Vec<(String, Value)> {
    let mut cells = Vec::new();
    if let Value::Object(map) = row {
        for (key, value) in map {
            flatten_into(key, value, &mut cells);
        }
    }
    cells
}

fn flatten_into(prefix: &str, value: &Value, cells: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                flatten_into(&format!("{prefix}.{key}"), inner, cells);
            }
        }
        leaf => cells.push((prefix.to_string(), leaf.clone())),
    }
}
