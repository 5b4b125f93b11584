//! Text binding: scalar substitution and template rendering
//!
//! Two modes. When the existing text carries template directives it is
//! rendered against the full normalized result and reinserted run by run,
//! decoding color markers while preserving each original run's non-color
//! formatting. Otherwise the selected scalar replaces the text inside the
//! first run, keeping its font. If selection fails, the whole result is
//! dumped as plain text rather than erroring.

use tracing::debug;

use crate::binding::BindingSpec;
use crate::document::{Paragraph, Run, RunFont, TextFrame};
use crate::error::LookdeckError;
use crate::normalize::ResultSet;
use crate::template::{self, TemplateContext};

use super::select_scalar;

pub fn bind_text(
    frame: &mut TextFrame,
    result: &ResultSet,
    spec: &BindingSpec,
) -> Result<(), LookdeckError> {
    let full_text = frame.full_text();

    if template::has_directives(&full_text) {
        let ctx = TemplateContext::from_result(result);
        let rendered = template::resolve(&full_text, &ctx)
            .map_err(|e| LookdeckError::Render(format!("template rendering failed: {e}")))?;
        reinsert_rendered_text(frame, &rendered);
        return Ok(());
    }

    let text = match select_scalar(result, spec) {
        Some(scalar) => scalar,
        None => {
            debug!("selection did not resolve; dumping full result");
            dump_result(result)
        }
    };
    set_plain_text(frame, &text);
    Ok(())
}

/// Columns joined with spaces, rows with newlines, header suppressed
fn dump_result(result: &ResultSet) -> String {
    result
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            (0..row.len())
                .map(|col| result.cell_text(row_idx, col).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the text while keeping the first run's formatting
fn set_plain_text(frame: &mut TextFrame, text: &str) {
    let font = frame
        .paragraphs
        .iter()
        .flat_map(|p| p.runs.first())
        .map(|r| r.font.clone())
        .next()
        .unwrap_or_default();
    let alignment = frame.first_alignment();

    frame.paragraphs = text
        .split('\n')
        .map(|line| Paragraph {
            alignment: alignment.clone(),
            runs: vec![Run {
                text: line.to_string(),
                font: font.clone(),
            }],
        })
        .collect();
}

/// Rebuild the frame from rendered text, cycling the original run formats
/// and applying decoded marker colors on top.
fn reinsert_rendered_text(frame: &mut TextFrame, rendered: &str) {
    let segments = template::decode_marked_segments(rendered);
    let fonts = frame.run_fonts();
    let alignment = frame.first_alignment();

    let mut paragraphs: Vec<Paragraph> = vec![Paragraph {
        alignment: alignment.clone(),
        runs: Vec::new(),
    }];
    let mut font_idx = 0;

    for (text, color) in &segments {
        for (line_no, line) in text.split('\n').enumerate() {
            if line_no > 0 {
                paragraphs.push(Paragraph {
                    alignment: alignment.clone(),
                    runs: Vec::new(),
                });
            }
            if line.is_empty() {
                continue;
            }

            let mut font = if fonts.is_empty() {
                RunFont::default()
            } else {
                let f = fonts[font_idx % fonts.len()].clone();
                font_idx += 1;
                f
            };
            if let Some(hex) = color {
                font = font.without_color();
                font.color = Some(hex.clone());
            }

            paragraphs
                .last_mut()
                .expect("at least one paragraph")
                .runs
                .push(Run {
                    text: line.to_string(),
                    font,
                });
        }
    }

    frame.paragraphs = paragraphs;
}
