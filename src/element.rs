//! Bound elements: one bindable unit per element with a binding description
//!
//! A collection pass walks the deck snapshot once, decodes each element's
//! binding blob, applies the per-kind push-down defaults and produces an
//! immutable [`BoundElement`] list. Parse failures drop the element and
//! never abort the pass.

use tracing::error;

use crate::binding::{parse_binding, BindingSpec};
use crate::document::{Content, Deck, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Text,
    Table,
    Chart,
    Image,
    Other,
}

impl ElementKind {
    fn of(content: &Content) -> Self {
        match content {
            Content::Text(_) => ElementKind::Text,
            Content::Table(_) => ElementKind::Table,
            Content::Chart(_) => ElementKind::Chart,
            Content::Image(_) => ElementKind::Image,
            Content::Shape(_) => ElementKind::Other,
        }
    }
}

/// Identifies one bindable unit in the deck; created once per parse pass,
/// never mutated.
#[derive(Debug, Clone)]
pub struct ElementRef {
    pub slide: usize,
    pub element_id: u32,
    pub kind: ElementKind,
    pub frame: Frame,
}

/// An element together with its decoded binding
#[derive(Debug, Clone)]
pub struct BoundElement {
    pub element: ElementRef,
    pub spec: BindingSpec,
    /// The spec as written, before push-down defaults
    pub original_spec: BindingSpec,
}

impl BoundElement {
    /// Key under which this element's fetched result is published.
    ///
    /// Meta elements publish under their declared `meta_name` so other
    /// bindings can reference the shared data by name; everything else is
    /// keyed by position.
    pub fn key(&self) -> String {
        match &self.spec.meta_name {
            Some(name) => name.clone(),
            None => format!("{},{}", self.element.slide, self.element.element_id),
        }
    }
}

/// Per-kind defaults the spec author should not have to spell out
fn push_down(spec: &mut BindingSpec, kind: ElementKind, frame: Frame) {
    match kind {
        ElementKind::Image => {
            if spec.result_format.is_none() {
                spec.result_format = Some("png".to_string());
            }
            spec.image_width = Some(frame.width.round() as u32);
            spec.image_height = Some(frame.height.round() as u32);
        }
        ElementKind::Table => {
            if spec.apply_formatting.is_none() {
                spec.apply_formatting = Some(true);
            }
        }
        _ => {}
    }
}

/// Walk the deck once and decode every binding description.
///
/// Returns the bound elements in slide order. Elements whose blob fails to
/// parse are logged and skipped.
pub fn collect_bound_elements(deck: &Deck) -> Vec<BoundElement> {
    let mut bound = Vec::new();

    for (slide_idx, slide) in deck.slides.iter().enumerate() {
        for element in &slide.elements {
            let Some(blob) = element.binding.as_deref() else {
                continue;
            };
            let original_spec = match parse_binding(blob) {
                Ok(spec) => spec,
                Err(e) => {
                    error!(
                        slide = slide_idx,
                        element = element.id,
                        "skipping element with invalid binding: {e}"
                    );
                    continue;
                }
            };

            let kind = ElementKind::of(&element.content);
            let mut spec = original_spec.clone();
            push_down(&mut spec, kind, element.frame);

            bound.push(BoundElement {
                element: ElementRef {
                    slide: slide_idx,
                    element_id: element.id,
                    kind,
                    frame: element.frame,
                },
                spec,
                original_spec,
            });
        }
    }

    bound
}
