//! Canonical query requests
//!
//! Turns a binding spec plus run-level overrides into the fully-resolved,
//! hashable representation of "what to fetch". Precedence is fixed: the
//! spec's own keyword overrides first, then `filter_overwrites`, then the
//! single run-level filter/value pair last, so an operator can steer a run
//! without editing the deck.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::binding::BindingSpec;

/// The base query carried by an upstream look
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WriteQuery {
    pub model: String,
    pub view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivots: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_total: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_fields: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vis_config: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_ui_sections: Option<String>,
}

/// An upstream look: an id plus the base query it carries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Look {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub query: WriteQuery,
}

/// Fully-resolved fetch: query body plus execution flags.
///
/// Two specs that resolve to structurally identical requests are one fetch;
/// [`QueryRequest::identity`] is the grouping key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub body: WriteQuery,
    pub result_format: String,
    pub apply_vis: bool,
    pub apply_formatting: bool,
    pub server_table_calcs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,
}

impl QueryRequest {
    /// Order-independent structural identity: canonical sorted-key JSON,
    /// then SHA-256. Maps are `BTreeMap`s, so the serialized form is
    /// already canonical.
    pub fn identity(&self) -> String {
        let canonical =
            serde_json::to_string(self).expect("query request serialization is infallible");
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Resolve a binding spec against its look's base query.
///
/// Merge order: (1) spec keyword overrides, (2) `filter_overwrites`,
/// (3) the run-level filter/value pair. A filter name missing from the
/// base query is logged and skipped, never an error.
pub fn build_request(
    spec: &BindingSpec,
    look: &Look,
    run_filter_value: Option<&str>,
) -> QueryRequest {
    let mut q = look.query.clone();

    for (name, value) in &spec.query_overrides {
        apply_override(&mut q, name, value);
    }

    for (field, value) in &spec.filter_overwrites {
        info!("overwriting filter {field} with value {value}");
        set_filter_if_known(&mut q, field, value);
    }

    if let (Some(field), Some(value)) = (spec.filter.as_deref(), run_filter_value) {
        info!("applying run-level filter {field} with value {value}");
        set_filter_if_known(&mut q, field, value);
    }

    QueryRequest {
        body: q,
        result_format: spec.result_format().to_string(),
        apply_vis: spec.apply_vis(),
        apply_formatting: spec.apply_formatting(),
        server_table_calcs: spec.server_table_calcs(),
        image_width: spec.wants_image().then_some(spec.image_width).flatten(),
        image_height: spec.wants_image().then_some(spec.image_height).flatten(),
    }
}

/// A filter may only be set when the base query already declares it;
/// anything else is a warn-and-skip no-op.
fn set_filter_if_known(q: &mut WriteQuery, field: &str, value: &str) {
    let filterable = q
        .filters
        .as_ref()
        .map(|m| m.contains_key(field))
        .unwrap_or(false);
    if filterable {
        q.filters
            .as_mut()
            .expect("checked above")
            .insert(field.to_string(), value.to_string());
    } else {
        warn!(
            "filter {field} not found in query filters; available: {:?}",
            q.filters.as_ref().map(|m| m.keys().collect::<Vec<_>>())
        );
    }
}

/// Apply one keyword override from the spec onto a base-query field.
/// List-valued fields append, scalar fields replace; names the query does
/// not recognize are ignored.
fn apply_override(q: &mut WriteQuery, name: &str, value: &Value) {
    match name {
        "fields" => append_list(&mut q.fields, value),
        "pivots" => append_list(&mut q.pivots, value),
        "fill_fields" => append_list(&mut q.fill_fields, value),
        "sorts" => append_list(&mut q.sorts, value),
        "subtotals" => append_list(&mut q.subtotals, value),
        "model" => replace_string(&mut q.model, value),
        "view" => replace_string(&mut q.view, value),
        "limit" => q.limit = scalar_string(value),
        "column_limit" => q.column_limit = scalar_string(value),
        "row_total" => q.row_total = scalar_string(value),
        "dynamic_fields" => q.dynamic_fields = scalar_string(value),
        "query_timezone" => q.query_timezone = scalar_string(value),
        "visible_ui_sections" => q.visible_ui_sections = scalar_string(value),
        "total" => {
            if let Value::Bool(b) = value {
                q.total = Some(*b);
            }
        }
        "filters" => {
            if let Value::Object(map) = value {
                let converted: BTreeMap<String, String> = map
                    .iter()
                    .filter_map(|(k, v)| scalar_string(v).map(|s| (k.clone(), s)))
                    .collect();
                q.filters = Some(converted);
            }
        }
        "vis_config" => {
            if let Value::Object(map) = value {
                q.vis_config = Some(map.clone().into_iter().collect());
            }
        }
        _ => debug!("ignoring unknown query override '{name}'"),
    }
}

fn append_list(target: &mut Option<Vec<String>>, value: &Value) {
    let additions: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    };
    if additions.is_empty() {
        return;
    }
    target.get_or_insert_with(Vec::new).extend(additions);
}

fn replace_string(target: &mut String, value: &Value) {
    if let Some(s) = scalar_string(value) {
        *target = s;
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
