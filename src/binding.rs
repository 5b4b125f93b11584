//! Binding specifications attached to deck elements
//!
//! Every bindable element carries a YAML blob in its description. This
//! module decodes that blob into a typed [`BindingSpec`]. Unknown keys are
//! never an error: they are collected and later offered to the query
//! builder as per-field overrides on the base query.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::LookdeckError;

/// What kind of reference the `id` field carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    /// A data-bearing look reference: resolves to a query and a fetch
    #[default]
    Look,
    /// A shared reference: reads data captured by a meta element
    Meta,
}

/// One element's declarative binding, decoded from its description blob
#[derive(Debug, Clone, Deserialize)]
pub struct BindingSpec {
    /// Upstream look id, or the shared key when `id_type: meta`
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub id_type: IdType,
    /// True when this element only pre-fetches shared data and renders nothing
    #[serde(default)]
    pub meta: bool,
    /// Shared key under which a meta element's result is published
    #[serde(default)]
    pub meta_name: Option<String>,
    /// Result-slice selector: column display label
    #[serde(default)]
    pub label: Option<String>,
    /// Result-slice selector: row index
    #[serde(default)]
    pub row: Option<usize>,
    /// Result-slice selector: column key, label or index
    #[serde(default, deserialize_with = "opt_scalar_as_string")]
    pub column: Option<String>,
    /// Dimension exposed to the run-level `--filter` value
    #[serde(default)]
    pub filter: Option<String>,
    /// Field → literal value, applied to the base query before execution
    #[serde(default, deserialize_with = "scalar_map")]
    pub filter_overwrites: BTreeMap<String, String>,
    #[serde(default)]
    pub result_format: Option<String>,
    /// Whether to derive display labels from result metadata
    #[serde(default)]
    pub headers: Option<bool>,
    #[serde(default)]
    pub apply_formatting: Option<bool>,
    #[serde(default)]
    pub apply_vis: Option<bool>,
    #[serde(default)]
    pub server_table_calcs: Option<bool>,
    /// Chart-only: show the data label on the latest non-empty point only
    #[serde(default)]
    pub show_latest_chart_label: bool,
    /// Requested render width in pixels (injected from the element frame)
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
    /// Every unrecognized key lands here and is offered to the query
    /// builder as an override on the matching base-query field.
    #[serde(flatten)]
    pub query_overrides: BTreeMap<String, Value>,
}

impl BindingSpec {
    pub fn result_format(&self) -> &str {
        self.result_format.as_deref().unwrap_or("json_bi")
    }

    pub fn headers(&self) -> bool {
        self.headers.unwrap_or(true)
    }

    pub fn apply_formatting(&self) -> bool {
        self.apply_formatting.unwrap_or(false)
    }

    pub fn apply_vis(&self) -> bool {
        self.apply_vis.unwrap_or(true)
    }

    pub fn server_table_calcs(&self) -> bool {
        self.server_table_calcs.unwrap_or(true)
    }

    /// True when the bound result is image bytes rather than tabular data
    pub fn wants_image(&self) -> bool {
        !self.result_format().eq_ignore_ascii_case("json_bi")
    }
}

/// Decode one element's description blob.
///
/// A failure here drops the element from the run; it never aborts the
/// batch. The caller logs and moves on.
pub fn parse_binding(raw: &str) -> Result<BindingSpec, LookdeckError> {
    serde_yaml::from_str::<BindingSpec>(raw)
        .map_err(|e| LookdeckError::Parse(format!("invalid binding description: {e}")))
}

/// Accept `id: 42` as well as `id: "42"`
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_to_string(Value::deserialize(deserializer)?)
        .ok_or_else(|| serde::de::Error::custom("id must be a string or a number"))
}

fn opt_scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(v) => scalar_to_string(v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected a string or a number")),
    }
}

/// Filter values may be written as numbers or booleans in YAML; Looker
/// filter expressions are strings.
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(k, v)| {
            scalar_to_string(v)
                .map(|s| (k, s))
                .ok_or_else(|| serde::de::Error::custom("filter values must be scalars"))
        })
        .collect()
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_binding_gets_defaults() {
        let spec = parse_binding("id: '42'").unwrap();
        assert_eq!(spec.id, "42");
        assert_eq!(spec.id_type, IdType::Look);
        assert!(!spec.meta);
        assert_eq!(spec.result_format(), "json_bi");
        assert!(spec.headers());
        assert!(!spec.apply_formatting());
        assert!(spec.apply_vis());
        assert!(spec.server_table_calcs());
        assert!(spec.query_overrides.is_empty());
    }

    #[test]
    fn integer_id_is_coerced() {
        let spec = parse_binding("id: 42").unwrap();
        assert_eq!(spec.id, "42");
    }

    #[test]
    fn missing_id_is_a_parse_error() {
        let err = parse_binding("label: revenue").unwrap_err();
        assert!(matches!(err, LookdeckError::Parse(_)));
    }

    #[test]
    fn unknown_keys_become_query_overrides() {
        let spec = parse_binding("id: 7\nlimit: '10'\nfields: orders.count").unwrap();
        assert_eq!(spec.query_overrides.len(), 2);
        assert_eq!(spec.query_overrides["limit"], "10");
    }

    #[test]
    fn meta_reference() {
        let spec = parse_binding("id: shared_kpis\nid_type: meta").unwrap();
        assert_eq!(spec.id_type, IdType::Meta);
    }

    #[test]
    fn filter_overwrites_accept_numbers() {
        let spec = parse_binding("id: 1\nfilter_overwrites:\n  orders.count: 10").unwrap();
        assert_eq!(spec.filter_overwrites["orders.count"], "10");
    }

    #[test]
    fn numeric_column_selector() {
        let spec = parse_binding("id: 1\ncolumn: 2\nrow: 1").unwrap();
        assert_eq!(spec.column.as_deref(), Some("2"));
        assert_eq!(spec.row, Some(1));
    }
}
