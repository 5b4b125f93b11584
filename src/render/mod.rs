//! # Element rendering
//!
//! Binds a fetched result into its element, polymorphic over the element
//! kind:
//!
//! | kind | binding algorithm |
//! |------|-------------------|
//! | TEXT | scalar substitution or template rendering ([`text`]) |
//! | TABLE | bounded grid fill ([`table`]) |
//! | CHART | series rebuild ([`chart`]) |
//! | IMAGE | aspect-fit image replacement ([`image`]) |
//!
//! Every element renders behind the failure isolator: a failure produces a
//! [`RenderOutcome::Failed`] for that element alone and the batch
//! continues. Rendering is strictly sequential; the deck has no internal
//! synchronization.

mod chart;
mod image;
mod table;
mod text;

use tracing::debug;

use crate::binding::IdType;
use crate::client::{QueryService, RawResult};
use crate::document::{Content, Deck};
use crate::element::{BoundElement, ElementKind};
use crate::error::LookdeckError;
use crate::normalize::{normalize, ResultSet};

/// Per-element result of one render step.
///
/// State machine per element: Parsed → QueryResolved → (Rendered | Skipped
/// | Failed). No transition is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered,
    Skipped(String),
    Failed(String),
}

impl RenderOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RenderOutcome::Failed(_))
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderOutcome::Rendered)
    }
}

/// Render one element from its captured result.
///
/// `raw` is `None` when the element's fetch failed or could not be built;
/// that is a per-element failure, not a batch abort.
pub async fn render_element(
    deck: &mut Deck,
    bound: &BoundElement,
    raw: Option<&RawResult>,
    service: &dyn QueryService,
) -> RenderOutcome {
    if bound.spec.meta {
        // Pure data source; pipeline strips it after the render phase.
        return RenderOutcome::Skipped("meta data source".to_string());
    }

    let Some(raw) = raw else {
        let what = match bound.spec.id_type {
            IdType::Meta => format!("shared data '{}' was never captured", bound.spec.id),
            IdType::Look => format!("no data for look {}", bound.spec.id),
        };
        return RenderOutcome::Failed(what);
    };

    let outcome = match bound.element.kind {
        ElementKind::Image => image::bind_image(deck, bound, raw, service).await,
        ElementKind::Text | ElementKind::Table | ElementKind::Chart => {
            bind_tabular(deck, bound, raw)
        }
        ElementKind::Other => {
            return RenderOutcome::Skipped("unsupported element kind".to_string())
        }
    };

    match outcome {
        Ok(()) => {
            debug!(
                slide = bound.element.slide,
                element = bound.element.element_id,
                "element rendered"
            );
            RenderOutcome::Rendered
        }
        Err(e) => RenderOutcome::Failed(e.to_string()),
    }
}

fn bind_tabular(
    deck: &mut Deck,
    bound: &BoundElement,
    raw: &RawResult,
) -> Result<(), LookdeckError> {
    let tabular = raw.as_tabular().ok_or_else(|| {
        LookdeckError::Render("image result bound to a non-image element".to_string())
    })?;
    let result = normalize(tabular);

    let element = deck
        .element_mut(bound.element.slide, bound.element.element_id)
        .ok_or_else(|| LookdeckError::Render("bound element no longer in deck".to_string()))?;

    match &mut element.content {
        Content::Table(grid) => table::fill_table(grid, &result, bound.spec.headers()),
        Content::Text(frame) => text::bind_text(frame, &result, &bound.spec),
        Content::Chart(chart) => chart::bind_chart(chart, &result, &bound.spec),
        _ => Err(LookdeckError::Render(
            "element content does not match its kind".to_string(),
        )),
    }
}

/// Resolve the spec's row/column/label selection to a single scalar
pub(crate) fn select_scalar(result: &ResultSet, spec: &crate::binding::BindingSpec) -> Option<String> {
    let selector = spec.column.as_deref().or(spec.label.as_deref());
    let col = match selector {
        Some(s) => result.column_index(s)?,
        None => 0,
    };
    let row = spec.row.unwrap_or(0);
    result.cell_text(row, col)
}
