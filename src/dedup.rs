//! Query deduplication
//!
//! Several elements frequently reference the same underlying data; the
//! fetch must happen once per distinct request, not once per element, and
//! every member of a group must see the same snapshot.

use indexmap::IndexMap;

use crate::query::QueryRequest;

/// One distinct fetch plus the element keys waiting on its result
#[derive(Debug, Clone)]
pub struct QueryGroup {
    pub identity: String,
    pub request: QueryRequest,
    pub members: Vec<String>,
}

/// Group requests by structural identity.
///
/// Group order and member order are both first-seen insertion order, so
/// any ordering-sensitive downstream behavior is deterministic.
pub fn group_by_identity(requests: Vec<(String, QueryRequest)>) -> Vec<QueryGroup> {
    let mut groups: IndexMap<String, QueryGroup> = IndexMap::new();

    for (key, request) in requests {
        let identity = request.identity();
        groups
            .entry(identity.clone())
            .or_insert_with(|| QueryGroup {
                identity,
                request,
                members: Vec::new(),
            })
            .members
            .push(key);
    }

    groups.into_values().collect()
}
