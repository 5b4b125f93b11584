//! The binding-resolution and rendering pipeline
//!
//! One run over a deck: collect bindings, resolve them into canonical
//! query requests (sequential, pure), deduplicate, execute every distinct
//! request concurrently, then render each element sequentially against its
//! shared result. Per-element failures annotate and continue; only deck
//! I/O is fatal, and that lives at the CLI boundary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, Timelike};
use tracing::{error, info, instrument, warn};

use crate::binding::IdType;
use crate::client::QueryService;
use crate::dedup::group_by_identity;
use crate::document::Deck;
use crate::element::collect_bound_elements;
use crate::error::LookdeckError;
use crate::executor::execute_groups;
use crate::query::{build_request, Look, QueryRequest};
use crate::render::{render_element, RenderOutcome};
use crate::store::ResultStore;

/// Run-level switches, from the CLI
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Value for each binding's declared filter field
    pub filter: Option<String>,
    /// Suppress visible failure markers
    pub hide_errors: bool,
    /// Overwriting the input: meta elements stay in place
    pub write_in_place: bool,
    /// Per-distinct-query raw result dump
    pub dump_dir: Option<PathBuf>,
}

/// One element's journey through the run
#[derive(Debug, Clone)]
pub struct ElementOutcome {
    pub key: String,
    pub slide: usize,
    pub element_id: u32,
    pub outcome: RenderOutcome,
}

/// What one run did
#[derive(Debug, Default)]
pub struct RunReport {
    pub bound_elements: usize,
    pub distinct_queries: usize,
    pub failed_queries: usize,
    pub outcomes: Vec<ElementOutcome>,
}

impl RunReport {
    pub fn rendered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_rendered())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_failed())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.rendered() - self.failed()
    }
}

/// Run the full pipeline over an in-memory deck.
///
/// The deck is the only mutable shared resource; it is mutated strictly
/// sequentially. Nothing is written to disk here, so an interrupted run
/// leaves the input untouched.
#[instrument(skip_all, fields(service = service.name()))]
pub async fn run_pipeline(
    deck: &mut Deck,
    service: &dyn QueryService,
    options: &RunOptions,
) -> Result<RunReport, LookdeckError> {
    let bound = collect_bound_elements(deck);
    if bound.is_empty() {
        warn!("no bound elements found in the deck");
        return Ok(RunReport::default());
    }
    info!("collected {} bound element(s)", bound.len());

    let store = ResultStore::new();

    // Build phase: sequential and pure apart from look resolution. Looks
    // are memoized so N elements on one look resolve it once.
    let mut looks: HashMap<String, Option<Look>> = HashMap::new();
    let mut requests: Vec<(String, QueryRequest)> = Vec::new();
    for b in &bound {
        if b.spec.id_type == IdType::Meta {
            continue;
        }
        if !looks.contains_key(&b.spec.id) {
            let fetched = match service.look(&b.spec.id).await {
                Ok(look) => Some(look),
                Err(e) => {
                    error!(
                        "look {} not resolvable (is this a meta reference missing \
                         id_type: meta?): {e:#}",
                        b.spec.id
                    );
                    None
                }
            };
            looks.insert(b.spec.id.clone(), fetched);
        }
        match looks.get(&b.spec.id).and_then(Clone::clone) {
            Some(look) => requests.push((
                b.key(),
                build_request(&b.spec, &look, options.filter.as_deref()),
            )),
            // Build failure: the element proceeds with a null result.
            None => store.insert(b.key(), None),
        }
    }

    let groups = group_by_identity(requests);
    info!("executing {} distinct query group(s)", groups.len());
    let execution = execute_groups(service, &groups, &store, options.dump_dir.as_deref()).await;

    // Render phase: strictly sequential, the deck has no internal
    // synchronization.
    let mut outcomes = Vec::with_capacity(bound.len());
    for b in &bound {
        let raw = match b.spec.id_type {
            IdType::Meta => store.captured(&b.spec.id),
            IdType::Look => store.captured(&b.key()),
        };
        let outcome = render_element(deck, b, raw.as_deref(), service).await;

        if let RenderOutcome::Failed(reason) = &outcome {
            error!(
                slide = b.element.slide,
                element = b.element.element_id,
                "element failed: {reason}"
            );
            if !options.hide_errors {
                deck.add_failure_marker(b.element.slide, b.element.frame);
            }
        }

        outcomes.push(ElementOutcome {
            key: b.key(),
            slide: b.element.slide,
            element_id: b.element.element_id,
            outcome,
        });
    }

    // Meta elements are scaffolding; strip them unless we overwrite the
    // source deck in place.
    if !options.write_in_place {
        for b in bound.iter().filter(|b| b.spec.meta) {
            deck.remove_element(b.element.slide, b.element.element_id);
        }
    }

    Ok(RunReport {
        bound_elements: bound.len(),
        distinct_queries: groups.len(),
        failed_queries: execution.failed,
        outcomes,
    })
}

/// Where the processed deck goes: the input itself under write-in-place,
/// otherwise `<output_dir>/<basename>` with date patterns expanded.
pub fn resolve_destination(
    input: &Path,
    output_dir: &Path,
    write_in_place: bool,
    now: &DateTime<Local>,
) -> PathBuf {
    if write_in_place {
        return input.to_path_buf();
    }
    let basename = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "deck.json".to_string());
    output_dir.join(expand_date_patterns(&basename, now))
}

/// Expand the strftime-style tokens allowed in output names
fn expand_date_patterns(name: &str, now: &DateTime<Local>) -> String {
    if !name.contains('%') {
        return name.to_string();
    }
    name.replace("%Y", &format!("{:04}", now.year()))
        .replace("%m", &format!("{:02}", now.month()))
        .replace("%d", &format!("{:02}", now.day()))
        .replace("%H", &format!("{:02}", now.hour()))
        .replace("%M", &format!("{:02}", now.minute()))
        .replace("%S", &format!("{:02}", now.second()))
}
