//! In-memory implementation of [`TraceStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests, ephemeral
//! sessions, and anywhere persistence isn't needed. It enforces the same
//! integrity rules as the SQLite backend.

use std::collections::{HashMap, HashSet};

use lmtrace_core::{Invocation, InvocationId, ProgramVersion, ProvenanceEdge, VersionId};

use crate::error::StorageError;
use crate::traits::TraceStore;

/// In-memory implementation of [`TraceStore`].
///
/// Invocations are kept in insertion order; secondary indexes hold
/// positions into that vector.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    versions: HashMap<VersionId, ProgramVersion>,
    /// Version ids per qualified name, in write order.
    versions_by_name: HashMap<String, Vec<VersionId>>,
    invocations: Vec<Invocation>,
    invocation_index: HashMap<InvocationId, usize>,
    /// `(version, cache_key)` -> positions in `invocations`
    cache_index: HashMap<(VersionId, String), Vec<usize>>,
    /// consumed id -> positions of consumers in `invocations`
    consumers: HashMap<InvocationId, Vec<usize>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, positions: Option<&Vec<usize>>) -> Vec<Invocation> {
        positions
            .map(|ps| ps.iter().map(|&p| self.invocations[p].clone()).collect())
            .unwrap_or_default()
    }
}

impl TraceStore for InMemoryStore {
    fn write_version(&mut self, version: &ProgramVersion) -> Result<bool, StorageError> {
        if self.versions.contains_key(&version.id) {
            return Ok(false);
        }
        let siblings = self.versions_by_name.entry(version.name.clone()).or_default();
        let clash = siblings
            .iter()
            .any(|id| self.versions[id].version_number == version.version_number);
        if clash {
            return Err(StorageError::IntegrityError {
                reason: format!(
                    "version number {} already assigned for '{}'",
                    version.version_number, version.name
                ),
            });
        }
        siblings.push(version.id.clone());
        self.versions.insert(version.id.clone(), version.clone());
        Ok(true)
    }

    fn write_invocation(&mut self, invocation: &Invocation) -> Result<(), StorageError> {
        let Some(version) = self.versions.get_mut(&invocation.version_id) else {
            return Err(StorageError::VersionNotFound(
                invocation.version_id.to_string(),
            ));
        };
        if self.invocation_index.contains_key(&invocation.id) {
            return Err(StorageError::IntegrityError {
                reason: format!("duplicate invocation id {}", invocation.id),
            });
        }
        version.num_invocations += 1;

        let position = self.invocations.len();
        self.invocations.push(invocation.clone());
        self.invocation_index.insert(invocation.id, position);
        self.cache_index
            .entry((invocation.version_id.clone(), invocation.cache_key.clone()))
            .or_default()
            .push(position);

        let mut seen = HashSet::new();
        for consumed in &invocation.consumed {
            if seen.insert(*consumed) {
                self.consumers.entry(*consumed).or_default().push(position);
            }
        }
        Ok(())
    }

    fn get_cached(
        &self,
        version: &VersionId,
        cache_key: &str,
    ) -> Result<Vec<Invocation>, StorageError> {
        Ok(self.collect(
            self.cache_index
                .get(&(version.clone(), cache_key.to_string())),
        ))
    }

    fn get_versions_by_name(&self, name: &str) -> Result<Vec<ProgramVersion>, StorageError> {
        let mut versions: Vec<ProgramVersion> = self
            .versions_by_name
            .get(name)
            .map(|ids| ids.iter().map(|id| self.versions[id].clone()).collect())
            .unwrap_or_default();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    fn get_version(&self, id: &VersionId) -> Result<Option<ProgramVersion>, StorageError> {
        Ok(self.versions.get(id).cloned())
    }

    fn get_provenance_edges(
        &self,
        invocation: InvocationId,
    ) -> Result<Vec<ProvenanceEdge>, StorageError> {
        let Some(&position) = self.invocation_index.get(&invocation) else {
            return Ok(Vec::new());
        };
        let mut seen = HashSet::new();
        Ok(self.invocations[position]
            .consumed
            .iter()
            .filter(|id| seen.insert(**id))
            .map(|&consumed| ProvenanceEdge {
                consumer: invocation,
                consumed,
            })
            .collect())
    }

    fn get_consumer_edges(
        &self,
        invocation: InvocationId,
    ) -> Result<Vec<ProvenanceEdge>, StorageError> {
        Ok(self
            .consumers
            .get(&invocation)
            .map(|ps| {
                ps.iter()
                    .map(|&p| ProvenanceEdge {
                        consumer: self.invocations[p].id,
                        consumed: invocation,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_invocation(&self, id: InvocationId) -> Result<Option<Invocation>, StorageError> {
        Ok(self
            .invocation_index
            .get(&id)
            .map(|&p| self.invocations[p].clone()))
    }

    fn list_invocations(&self, version: &VersionId) -> Result<Vec<Invocation>, StorageError> {
        Ok(self
            .invocations
            .iter()
            .filter(|inv| &inv.version_id == version)
            .cloned()
            .collect())
    }

    fn list_program_names(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.versions_by_name.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmtrace_core::{Usage, Value};

    use crate::hash::hash_version;

    fn version(name: &str, source: &str, number: u32) -> ProgramVersion {
        ProgramVersion {
            id: hash_version(source, ""),
            name: name.to_string(),
            source: source.to_string(),
            dependencies: String::new(),
            dependency_ids: Vec::new(),
            initial_globals: "{}".into(),
            initial_free_vars: "{}".into(),
            version_number: number,
            commit_message: None,
            created_at: "1970-01-01T00:00:00.000Z".into(),
            num_invocations: 0,
        }
    }

    fn invocation(version: &VersionId, key: &str, consumed: Vec<InvocationId>) -> Invocation {
        Invocation {
            id: InvocationId::new(),
            version_id: version.clone(),
            cache_key: key.to_string(),
            args: "{}".into(),
            latency_ms: 0.0,
            usage: Usage::default(),
            created_at: "1970-01-01T00:00:00.000Z".into(),
            result: Value::from("ok"),
            used_by: None,
            consumed,
        }
    }

    #[test]
    fn write_version_is_idempotent() {
        let mut store = InMemoryStore::new();
        let v = version("greet", "src", 0);
        assert!(store.write_version(&v).unwrap());
        assert!(!store.write_version(&v).unwrap());
        assert_eq!(store.get_versions_by_name("greet").unwrap().len(), 1);
    }

    #[test]
    fn version_number_clash_is_rejected() {
        let mut store = InMemoryStore::new();
        store.write_version(&version("greet", "a", 0)).unwrap();
        let err = store.write_version(&version("greet", "b", 0)).unwrap_err();
        assert!(matches!(err, StorageError::IntegrityError { .. }));
    }

    #[test]
    fn invocation_requires_version() {
        let mut store = InMemoryStore::new();
        let v = version("greet", "src", 0);
        let err = store
            .write_invocation(&invocation(&v.id, "k", vec![]))
            .unwrap_err();
        assert!(matches!(err, StorageError::VersionNotFound(_)));
    }

    #[test]
    fn invocation_bumps_counter_and_indexes_cache() {
        let mut store = InMemoryStore::new();
        let v = version("greet", "src", 0);
        store.write_version(&v).unwrap();
        let first = invocation(&v.id, "k", vec![]);
        store.write_invocation(&first).unwrap();
        store.write_invocation(&invocation(&v.id, "k", vec![])).unwrap();
        store.write_invocation(&invocation(&v.id, "other", vec![])).unwrap();

        let cached = store.get_cached(&v.id, "k").unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].id, first.id, "oldest first");
        assert_eq!(store.get_version(&v.id).unwrap().unwrap().num_invocations, 3);
    }

    #[test]
    fn consumer_edges_are_indexed_both_ways() {
        let mut store = InMemoryStore::new();
        let v = version("greet", "src", 0);
        store.write_version(&v).unwrap();
        let upstream = invocation(&v.id, "a", vec![]);
        store.write_invocation(&upstream).unwrap();
        let downstream = invocation(&v.id, "b", vec![upstream.id, upstream.id]);
        store.write_invocation(&downstream).unwrap();

        let up = store.get_provenance_edges(downstream.id).unwrap();
        assert_eq!(
            up,
            vec![ProvenanceEdge {
                consumer: downstream.id,
                consumed: upstream.id
            }]
        );
        let down = store.get_consumer_edges(upstream.id).unwrap();
        assert_eq!(down, up);
    }
}
