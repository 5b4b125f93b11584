//! Single-pass template resolver with caching
//!
//! Text elements may embed directives like `{{orders_count}}`,
//! `{{rows[2].orders_count}}` or `{{delta | colorize_sign}}`. Templates
//! are tokenized once and cached; resolution is a single pass over the
//! tokens against the normalized result's row records.
//!
//! `colorize_sign` wraps its value in control-character markers carrying a
//! color; the text renderer decodes those markers back into colored runs.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::{display, ResultSet};

/// Marker bytes for colored segments (start, separator, end)
const MARK_START: char = '\u{0002}';
const MARK_SEP: char = '\u{0003}';
const MARK_END: char = '\u{0004}';

const POSITIVE_HEX: &str = "#008000";
const NEGATIVE_HEX: &str = "#C00000";
const NEUTRAL_HEX: &str = "#000000";

static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{[^}]*\}\}").unwrap());

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("\u{0002}(#[0-9A-Fa-f]{6})\u{0003}((?s).*?)\u{0004}").unwrap()
});

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// Emoji and a broad set of pictographs/symbols; stripped from template
// context values because slide fonts rarely carry them.
static EMOJI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        "[",
        "\u{1F600}-\u{1F64F}",
        "\u{1F300}-\u{1F5FF}",
        "\u{1F680}-\u{1F6FF}",
        "\u{1F1E0}-\u{1F1FF}",
        "\u{2702}-\u{27B0}",
        "\u{24C2}-\u{1F251}",
        "\u{1F900}-\u{1F9FF}",
        "\u{1FA70}-\u{1FAFF}",
        "\u{2600}-\u{26FF}",
        "]+",
    ))
    .unwrap()
});

/// True when the text contains template directives
pub fn has_directives(text: &str) -> bool {
    DIRECTIVE_RE.is_match(text)
}

pub fn strip_emojis(text: &str) -> String {
    EMOJI_RE.replace_all(text, "").to_string()
}

/// Token representing a parsed template fragment
#[derive(Debug, Clone)]
pub enum Token {
    /// Literal text (stores range in original string)
    Literal(Range<usize>),
    /// Field reference: {{column}} or {{rows[N].column}}
    Field {
        row: Option<usize>,
        column: String,
        colorize: bool,
    },
}

/// Row records the directives resolve against
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub rows: Vec<BTreeMap<String, String>>,
}

impl TemplateContext {
    /// Build row records from a normalized result. Column labels become
    /// identifier-safe names (whitespace → underscores); emojis are
    /// stripped from both names and values.
    pub fn from_result(result: &ResultSet) -> Self {
        let names: Vec<String> = result
            .columns
            .iter()
            .map(|c| identifier_name(&c.label))
            .collect();

        let rows = result
            .rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.clone(), strip_emojis(&display(value))))
                    .collect()
            })
            .collect();

        Self { rows }
    }

    fn get(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }
}

/// Whitespace → underscores, so labels work as directive identifiers
pub fn identifier_name(label: &str) -> String {
    let cleaned = strip_emojis(label);
    WS_RE
        .replace_all(cleaned.trim(), "_")
        .trim_matches('_')
        .to_string()
}

/// Template resolver with caching
pub struct TemplateResolver {
    /// Cache of parsed templates
    cache: DashMap<String, Arc<Vec<Token>>>,
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateResolver {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Parse template into tokens (with caching)
    pub fn tokenize(&self, template: &str) -> Arc<Vec<Token>> {
        if let Some(cached) = self.cache.get(template) {
            return Arc::clone(&cached);
        }

        let mut tokens = Vec::new();
        let mut rest = 0;
        let bytes = template.as_bytes();
        let mut i = 0;

        while i + 1 < bytes.len() {
            if bytes[i] == b'{' && bytes[i + 1] == b'{' {
                if let Some(close) = template[i + 2..].find("}}") {
                    let inner = &template[i + 2..i + 2 + close];
                    if let Some(token) = parse_field(inner) {
                        if i > rest {
                            tokens.push(Token::Literal(rest..i));
                        }
                        tokens.push(token);
                        i += 2 + close + 2;
                        rest = i;
                        continue;
                    }
                }
            }
            i += 1;
        }

        if rest < template.len() {
            tokens.push(Token::Literal(rest..template.len()));
        }

        let tokens = Arc::new(tokens);
        self.cache.insert(template.to_string(), tokens.clone());
        tokens
    }

    /// Resolve a template against row records. Unresolvable references
    /// keep their original directive text.
    pub fn resolve(&self, template: &str, ctx: &TemplateContext) -> Result<String> {
        let tokens = self.tokenize(template);
        let mut result = String::with_capacity(template.len() * 2);

        for token in tokens.iter() {
            match token {
                Token::Literal(range) => result.push_str(&template[range.clone()]),
                Token::Field {
                    row,
                    column,
                    colorize,
                } => {
                    let row_idx = row.unwrap_or(0);
                    match ctx.get(row_idx, column) {
                        Some(value) if *colorize => result.push_str(&colorize_sign(value)),
                        Some(value) => result.push_str(value),
                        None => {
                            // Keep original directive if not found
                            match row {
                                Some(r) => {
                                    result.push_str(&format!("{{{{rows[{r}].{column}}}}}"))
                                }
                                None => result.push_str(&format!("{{{{{column}}}}}")),
                            }
                        }
                    }
                }
            }
        }

        Ok(result)
    }
}

/// Parse the inside of a `{{ ... }}` directive
fn parse_field(inner: &str) -> Option<Token> {
    let mut parts = inner.split('|');
    let reference = parts.next()?.trim();
    let colorize = match parts.next().map(str::trim) {
        None => false,
        Some("colorize_sign") => true,
        Some(_) => return None,
    };
    if parts.next().is_some() || reference.is_empty() {
        return None;
    }

    if let Some(rest) = reference.strip_prefix("rows[") {
        let (idx, column) = rest.split_once("].")?;
        let row: usize = idx.trim().parse().ok()?;
        let column = column.trim();
        if column.is_empty() {
            return None;
        }
        return Some(Token::Field {
            row: Some(row),
            column: column.to_string(),
            colorize,
        });
    }

    if reference.contains(char::is_whitespace) {
        return None;
    }
    Some(Token::Field {
        row: None,
        column: reference.to_string(),
        colorize,
    })
}

/// Global template resolver instance
pub static TEMPLATE_RESOLVER: Lazy<TemplateResolver> = Lazy::new(TemplateResolver::new);

/// Convenience function for resolving templates
pub fn resolve(template: &str, ctx: &TemplateContext) -> Result<String> {
    TEMPLATE_RESOLVER.resolve(template, ctx)
}

// ---------------------------------------------------------------------------
// Colorize-by-sign
// ---------------------------------------------------------------------------

/// Wrap a value in color markers by its numeric sign
pub fn colorize_sign(value: &str) -> String {
    let color = match parse_number(value) {
        Some(n) if n > 0.0 => POSITIVE_HEX,
        Some(n) if n < 0.0 => NEGATIVE_HEX,
        _ => NEUTRAL_HEX,
    };
    encode_colored_text(value, color)
}

pub fn encode_colored_text(text: &str, hex_color: &str) -> String {
    format!("{MARK_START}{hex_color}{MARK_SEP}{text}{MARK_END}")
}

/// Split rendered text into (text, optional color) segments
pub fn decode_marked_segments(rendered: &str) -> Vec<(String, Option<String>)> {
    let mut segments = Vec::new();
    let mut pos = 0;
    for caps in MARKER_RE.captures_iter(rendered) {
        let whole = caps.get(0).unwrap();
        if whole.start() > pos {
            segments.push((rendered[pos..whole.start()].to_string(), None));
        }
        segments.push((caps[2].to_string(), Some(caps[1].to_string())));
        pos = whole.end();
    }
    if pos < rendered.len() {
        segments.push((rendered[pos..].to_string(), None));
    }
    segments
}

/// Parse a display value as a number: thousands separators, leading
/// currency symbols, trailing units and parenthesized negatives.
pub fn parse_number(value: &str) -> Option<f64> {
    static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(([\d.,\-]+)\)$").unwrap());
    static LEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\d\-+.]+").unwrap());
    static TRAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.eE]+$").unwrap());

    let s = strip_emojis(value);
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(caps) = PAREN_RE.captures(s) {
        let inner = caps[1].replace(',', "");
        return inner.parse::<f64>().ok().map(|n| -n);
    }

    let s = s.replace(',', "").replace(' ', "");
    let s = LEAD_RE.replace(&s, "");
    let s = TRAIL_RE.replace(&s, "");
    s.parse().ok()
}
