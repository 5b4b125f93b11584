//! Deck snapshot model
//!
//! The pipeline never touches a binary slide container. It works on a JSON
//! deck snapshot: slides holding elements with a frame, an optional binding
//! description, and typed content (text runs, table grid, chart series,
//! image bytes). Reading and writing the snapshot is the whole document
//! capability surface the core needs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LookdeckError;

/// Outline color of the failure marker overlay
pub const MARKER_COLOR: &str = "#FF0000";
/// Outline width of the failure marker, in points
pub const MARKER_WIDTH_PT: f64 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Deck {
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Slide {
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// Position and size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Frame {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    /// Stable id within the slide
    pub id: u32,
    #[serde(default)]
    pub name: String,
    /// Raw binding description (YAML), when the element is bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    pub frame: Frame,
    pub content: Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Text(TextFrame),
    Table(TableGrid),
    Chart(ChartFrame),
    Image(ImageFrame),
    Shape(ShapeStyle),
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TextFrame {
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Paragraph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<String>,
    #[serde(default)]
    pub runs: Vec<Run>,
}

/// A contiguous stretch of identically formatted text
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Run {
    pub text: String,
    #[serde(default)]
    pub font: RunFont,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunFont {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl RunFont {
    /// Everything except the color, which render steps control separately
    pub fn without_color(&self) -> RunFont {
        RunFont {
            color: None,
            ..self.clone()
        }
    }
}

impl TextFrame {
    /// Full text, paragraphs joined with newlines
    pub fn full_text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.runs.iter().map(|r| r.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Fonts of every run in document order, for format-preserving reinsertion
    pub fn run_fonts(&self) -> Vec<RunFont> {
        self.paragraphs
            .iter()
            .flat_map(|p| p.runs.iter().map(|r| r.font.clone()))
            .collect()
    }

    /// Alignment of the first paragraph, inherited by appended paragraphs
    pub fn first_alignment(&self) -> Option<String> {
        self.paragraphs.first().and_then(|p| p.alignment.clone())
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A fixed-size grid; the designed layout never grows during a render
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableGrid {
    pub rows: usize,
    pub cols: usize,
    /// Row-major cell text, `rows * cols` entries
    pub cells: Vec<String>,
}

impl TableGrid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![String::new(); rows * cols],
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        if row < self.rows && col < self.cols {
            Some(self.cells[row * self.cols + col].as_str())
        } else {
            None
        }
    }

    pub fn set_cell(&mut self, row: usize, col: usize, text: impl Into<String>) {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col] = text.into();
        }
    }
}

// ---------------------------------------------------------------------------
// Chart
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChartFrame {
    pub categories: Vec<String>,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Series {
    pub name: String,
    /// One entry per category; `None` is an empty point
    pub values: Vec<Option<f64>>,
    /// Per-point data-label visibility; `None` means the chart default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_labels: Option<Vec<bool>>,
}

// ---------------------------------------------------------------------------
// Image / shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImageFrame {
    /// Base64-encoded image bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShapeStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

// ---------------------------------------------------------------------------
// Deck operations
// ---------------------------------------------------------------------------

impl Deck {
    pub fn load(path: &Path) -> Result<Self, LookdeckError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| LookdeckError::Document(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<(), LookdeckError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| LookdeckError::Document(e.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn element(&self, slide: usize, id: u32) -> Option<&Element> {
        self.slides.get(slide)?.elements.iter().find(|e| e.id == id)
    }

    pub fn element_mut(&mut self, slide: usize, id: u32) -> Option<&mut Element> {
        self.slides
            .get_mut(slide)?
            .elements
            .iter_mut()
            .find(|e| e.id == id)
    }

    /// Remove one element; used to strip meta scaffolding from the output
    pub fn remove_element(&mut self, slide: usize, id: u32) -> bool {
        let Some(s) = self.slides.get_mut(slide) else {
            return false;
        };
        let before = s.elements.len();
        s.elements.retain(|e| e.id != id);
        s.elements.len() != before
    }

    /// Overlay a bright, unfilled outline at the failed element's frame
    pub fn add_failure_marker(&mut self, slide: usize, frame: Frame) {
        let Some(s) = self.slides.get_mut(slide) else {
            return;
        };
        let id = s.elements.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        s.elements.push(Element {
            id,
            name: "lookdeck-error".to_string(),
            binding: None,
            frame,
            content: Content::Shape(ShapeStyle {
                outline_color: Some(MARKER_COLOR.to_string()),
                outline_width: Some(MARKER_WIDTH_PT),
                fill: None,
            }),
        });
    }
}
