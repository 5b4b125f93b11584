//! Error types with fix suggestions

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
/// Per-element variants (`Parse`, `Build`, `Execution`, `Render`) are caught
/// by the pipeline and never abort a run; `Io`, `Config` and `Document` are
/// fatal at the CLI boundary.
#[derive(Error, Debug)]
pub enum LookdeckError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binding parse error: {0}")]
    Parse(String),

    #[error("Query build error: {0}")]
    Build(String),

    #[error("Query execution error: {0}")]
    Execution(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document error: {0}")]
    Document(String),
}

impl FixSuggestion for LookdeckError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            LookdeckError::YamlParse(_) => {
                Some("Check the element's binding text: indentation and quoting")
            }
            LookdeckError::Io(_) => Some("Check file path and permissions"),
            LookdeckError::Parse(_) => {
                Some("A binding needs at least 'id: <look id>' in the element description")
            }
            LookdeckError::Build(_) => {
                Some("Verify the look id exists; meta references need id_type: meta")
            }
            LookdeckError::Execution(_) => {
                Some("Check the Looker connection and that the query is runnable")
            }
            LookdeckError::Render(_) => {
                Some("Check the element type matches the bound result shape")
            }
            LookdeckError::Config(_) => Some(
                "Set LOOKERSDK_BASE_URL, LOOKERSDK_CLIENT_ID and LOOKERSDK_CLIENT_SECRET \
                 (environment or .env file)",
            ),
            LookdeckError::Document(_) => {
                Some("Check the deck file is a valid deck snapshot (.deck.json)")
            }
        }
    }
}
