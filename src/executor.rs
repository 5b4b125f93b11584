//! Concurrent query execution
//!
//! All distinct groups execute in parallel with no ordering guarantee
//! among themselves; the pipeline suspends at a single join point until
//! every group has completed, because a meta element's result may be
//! needed by any element rendered later. A failed group nulls its own
//! members only.

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::client::{QueryService, RawResult};
use crate::dedup::QueryGroup;
use crate::store::ResultStore;

/// What happened across one execution pass
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub executed: usize,
    pub failed: usize,
}

/// Execute every group concurrently and fan results out to member keys.
///
/// With `dump_dir` set, each distinct query's raw result is written to
/// `<dir>/<identity>.json` (or `.bin` for image results) for offline
/// inspection.
#[instrument(skip_all, fields(groups = groups.len()))]
pub async fn execute_groups(
    service: &dyn QueryService,
    groups: &[QueryGroup],
    store: &ResultStore,
    dump_dir: Option<&Path>,
) -> ExecutionReport {
    let executions = groups
        .iter()
        .map(|group| async move { service.run_query(&group.request).await });
    let outcomes = join_all(executions).await;

    let mut report = ExecutionReport {
        executed: groups.len(),
        ..ExecutionReport::default()
    };

    for (group, outcome) in groups.iter().zip(outcomes) {
        match outcome {
            Ok(raw) => {
                debug!(
                    identity = %group.identity,
                    members = group.members.len(),
                    "query group executed"
                );
                if let Some(dir) = dump_dir {
                    dump_raw_result(dir, &group.identity, &raw);
                }
                let shared = Arc::new(raw);
                for member in &group.members {
                    store.insert(member.clone(), Some(Arc::clone(&shared)));
                }
            }
            Err(e) => {
                warn!(identity = %group.identity, "query group failed: {e:#}");
                report.failed += 1;
                for member in &group.members {
                    store.insert(member.clone(), None);
                }
            }
        }
    }

    report
}

fn dump_raw_result(dir: &Path, identity: &str, raw: &RawResult) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("cannot create dump directory {}: {e}", dir.display());
        return;
    }
    let written = match raw {
        RawResult::Tabular(value) => {
            let path = dir.join(format!("{identity}.json"));
            serde_json::to_string_pretty(value)
                .map_err(std::io::Error::other)
                .and_then(|text| std::fs::write(path, text))
        }
        RawResult::Binary(bytes) => std::fs::write(dir.join(format!("{identity}.bin")), bytes),
    };
    if let Err(e) = written {
        warn!("cannot dump result {identity}: {e}");
    }
}
