//! Lookdeck - binds Looker query results into slide deck elements

pub mod binding;
pub mod client;
pub mod config;
pub mod dedup;
pub mod document;
pub mod element;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod render;
pub mod store;
pub mod template;

pub use binding::{parse_binding, BindingSpec, IdType};
pub use client::{LookerClient, MockQueryService, QueryService, RawResult};
pub use config::LookerConfig;
pub use document::Deck;
pub use element::{collect_bound_elements, BoundElement, ElementKind, ElementRef};
pub use error::{FixSuggestion, LookdeckError};
pub use normalize::{normalize, ResultSet};
pub use pipeline::{resolve_destination, run_pipeline, RunOptions, RunReport};
pub use query::{build_request, Look, QueryRequest, WriteQuery};
pub use render::RenderOutcome;
pub use store::ResultStore;
