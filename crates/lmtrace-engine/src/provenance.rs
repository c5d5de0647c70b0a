//! Bounded provenance traversal.
//!
//! Breadth-first over consumed-by edges starting from one invocation.
//! Upstream follows what an invocation consumed; downstream follows who
//! consumed it. Nodes at the depth bound are reported but not expanded,
//! and each node is visited once, so diamonds and cycles terminate.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use lmtrace_core::{InvocationId, ProvenanceEdge};
use lmtrace_storage::{StorageError, TraceStore};

/// Which way to walk the consumed-by graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Toward the invocations that were consumed.
    #[default]
    Upstream,
    /// Toward the invocations that consumed.
    Downstream,
}

/// An edge found during traversal, with the hop count at which it was
/// reached (1 for edges touching the start node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceEdge {
    #[serde(flatten)]
    pub edge: ProvenanceEdge,
    pub depth: usize,
}

/// Walks edges from `start` in `direction`, at most `max_depth` hops.
///
/// Edges come out in breadth-first order; within a node, in the store's
/// edge order. An edge is reported only when it reaches a node not yet
/// visited.
pub fn trace(
    store: &dyn TraceStore,
    start: InvocationId,
    direction: Direction,
    max_depth: usize,
) -> Result<Vec<TraceEdge>, StorageError> {
    let mut edges = Vec::new();
    let mut visited = HashSet::from([start]);
    let mut queue = VecDeque::from([(start, 0usize)]);

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let step = match direction {
            Direction::Upstream => store.get_provenance_edges(node)?,
            Direction::Downstream => store.get_consumer_edges(node)?,
        };
        for edge in step {
            let next = match direction {
                Direction::Upstream => edge.consumed,
                Direction::Downstream => edge.consumer,
            };
            if visited.insert(next) {
                edges.push(TraceEdge {
                    edge,
                    depth: depth + 1,
                });
                queue.push_back((next, depth + 1));
            }
        }
    }

    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmtrace_core::{Invocation, ProgramVersion, Usage, Value, VersionId};
    use lmtrace_storage::InMemoryStore;

    fn version() -> ProgramVersion {
        ProgramVersion {
            id: VersionId::from_hex_unchecked("ab".repeat(32)),
            name: "p".into(),
            source: String::new(),
            dependencies: String::new(),
            dependency_ids: vec![],
            initial_globals: "{}".into(),
            initial_free_vars: "{}".into(),
            version_number: 0,
            commit_message: None,
            created_at: String::new(),
            num_invocations: 0,
        }
    }

    fn record(store: &mut InMemoryStore, consumed: Vec<InvocationId>) -> InvocationId {
        let id = InvocationId::new();
        store
            .write_invocation(&Invocation {
                id,
                version_id: version().id,
                cache_key: id.to_string(),
                args: "{}".into(),
                latency_ms: 0.0,
                usage: Usage::default(),
                created_at: String::new(),
                result: Value::from("x"),
                used_by: None,
                consumed,
            })
            .unwrap();
        id
    }

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.write_version(&version()).unwrap();
        store
    }

    #[test]
    fn chain_is_cut_at_depth() {
        let mut s = store();
        let mut chain = vec![record(&mut s, vec![])];
        for _ in 0..6 {
            let prev = *chain.last().unwrap();
            chain.push(record(&mut s, vec![prev]));
        }
        let tip = *chain.last().unwrap();

        let edges = trace(&s, tip, Direction::Upstream, 4).unwrap();
        assert_eq!(edges.len(), 4);
        assert!(edges.iter().all(|e| e.depth <= 4));
        assert_eq!(edges[0].edge.consumer, tip);
        assert_eq!(edges[3].edge.consumed, chain[2]);
    }

    #[test]
    fn diamond_visits_shared_node_once() {
        let mut s = store();
        let root = record(&mut s, vec![]);
        let left = record(&mut s, vec![root]);
        let right = record(&mut s, vec![root]);
        let top = record(&mut s, vec![left, right]);

        let edges = trace(&s, top, Direction::Upstream, 4).unwrap();
        let consumed: Vec<_> = edges.iter().map(|e| e.edge.consumed).collect();
        assert_eq!(consumed, vec![left, right, root]);
    }

    #[test]
    fn downstream_follows_consumers() {
        let mut s = store();
        let root = record(&mut s, vec![]);
        let a = record(&mut s, vec![root]);
        let b = record(&mut s, vec![a]);

        let edges = trace(&s, root, Direction::Downstream, 4).unwrap();
        let consumers: Vec<_> = edges.iter().map(|e| e.edge.consumer).collect();
        assert_eq!(consumers, vec![a, b]);
        assert_eq!(edges[1].depth, 2);
    }

    #[test]
    fn zero_depth_yields_nothing() {
        let mut s = store();
        let root = record(&mut s, vec![]);
        let top = record(&mut s, vec![root]);
        assert!(trace(&s, top, Direction::Upstream, 0).unwrap().is_empty());
    }

    #[test]
    fn leaf_has_no_edges() {
        let mut s = store();
        let leaf = record(&mut s, vec![]);
        assert!(trace(&s, leaf, Direction::Upstream, 4).unwrap().is_empty());
    }
}
