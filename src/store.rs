//! Shared result storage
//!
//! The executor fans each group's result out to every member key; render
//! steps later read by key. Results are shared by reference and never
//! mutated after insertion. A key holding `None` records a failed or
//! unresolvable fetch, which downstream treats as "no data".

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::RawResult;

#[derive(Clone, Default)]
pub struct ResultStore {
    results: Arc<DashMap<String, Option<Arc<RawResult>>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, result: Option<Arc<RawResult>>) {
        self.results.insert(key.into(), result);
    }

    /// True when the key was seen at all, even if its fetch failed
    pub fn contains(&self, key: &str) -> bool {
        self.results.contains_key(key)
    }

    /// The captured result, or `None` for unknown keys and failed fetches
    pub fn captured(&self, key: &str) -> Option<Arc<RawResult>> {
        self.results.get(key).and_then(|r| r.value().clone())
    }
}
