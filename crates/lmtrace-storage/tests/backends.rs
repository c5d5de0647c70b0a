//! Backend parity: the same contract checks run against every store.

use lmtrace_core::{Invocation, InvocationId, ProgramVersion, Usage, Value, VersionId};
use lmtrace_storage::{hash_version, InMemoryStore, SqliteStore, StorageError, TraceStore};

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
        created_at: "2026-01-01T00:00:00.000Z".into(),
        num_invocations: 0,
    }
}

fn invocation(version: &VersionId, key: &str, consumed: Vec<InvocationId>) -> Invocation {
    Invocation {
        id: InvocationId::new(),
        version_id: version.clone(),
        cache_key: key.to_string(),
        args: r#"{"args":[],"kwargs":{}}"#.into(),
        latency_ms: 1.0,
        usage: Usage::default(),
        created_at: "2026-01-01T00:00:00.000Z".into(),
        result: Value::from(format!("result for {key}")),
        used_by: None,
        consumed,
    }
}

fn versions_are_listed_in_number_order(store: &mut dyn TraceStore) {
    store.write_version(&version("greet", "v2", 2)).unwrap();
    store.write_version(&version("greet", "v0", 0)).unwrap();
    store.write_version(&version("greet", "v1", 1)).unwrap();
    store.write_version(&version("other", "o0", 0)).unwrap();

    let numbers: Vec<u32> = store
        .get_versions_by_name("greet")
        .unwrap()
        .iter()
        .map(|v| v.version_number)
        .collect();
    assert_eq!(numbers, vec![0, 1, 2]);
    assert_eq!(
        store.list_program_names().unwrap(),
        vec!["greet".to_string(), "other".to_string()]
    );
    assert!(store.get_versions_by_name("missing").unwrap().is_empty());
}

fn cache_lookup_returns_oldest_first(store: &mut dyn TraceStore) {
    let v = version("greet", "src", 0);
    store.write_version(&v).unwrap();
    let a = invocation(&v.id, "k", vec![]);
    let b = invocation(&v.id, "k", vec![]);
    store.write_invocation(&a).unwrap();
    store.write_invocation(&b).unwrap();

    let ids: Vec<InvocationId> = store
        .get_cached(&v.id, "k")
        .unwrap()
        .iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(ids, vec![a.id, b.id]);
    assert!(store.get_cached(&v.id, "nope").unwrap().is_empty());
}

fn duplicate_invocation_is_rejected(store: &mut dyn TraceStore) {
    let v = version("greet", "src", 0);
    store.write_version(&v).unwrap();
    let a = invocation(&v.id, "k", vec![]);
    store.write_invocation(&a).unwrap();
    let err = store.write_invocation(&a).unwrap_err();
    assert!(matches!(err, StorageError::IntegrityError { .. }), "{err}");
}

fn consumed_edges_keep_recorded_order(store: &mut dyn TraceStore) {
    let v = version("greet", "src", 0);
    store.write_version(&v).unwrap();
    let a = invocation(&v.id, "a", vec![]);
    let b = invocation(&v.id, "b", vec![]);
    store.write_invocation(&a).unwrap();
    store.write_invocation(&b).unwrap();
    let c = invocation(&v.id, "c", vec![b.id, a.id]);
    store.write_invocation(&c).unwrap();

    let consumed: Vec<InvocationId> = store
        .get_provenance_edges(c.id)
        .unwrap()
        .iter()
        .map(|e| e.consumed)
        .collect();
    assert_eq!(consumed, vec![b.id, a.id]);
    assert!(store.get_provenance_edges(InvocationId::new()).unwrap().is_empty());
    assert_eq!(store.get_invocation(c.id).unwrap().unwrap().consumed, vec![b.id, a.id]);
}

macro_rules! backend_tests {
    ($module:ident, $ctor:expr) => {
        mod $module {
            use super::*;

            #[test]
            fn versions_are_listed_in_number_order() {
                super::versions_are_listed_in_number_order(&mut $ctor);
            }

            #[test]
            fn cache_lookup_returns_oldest_first() {
                super::cache_lookup_returns_oldest_first(&mut $ctor);
            }

            #[test]
            fn duplicate_invocation_is_rejected() {
                super::duplicate_invocation_is_rejected(&mut $ctor);
            }

            #[test]
            fn consumed_edges_keep_recorded_order() {
                super::consumed_edges_keep_recorded_order(&mut $ctor);
            }
        }
    };
}

backend_tests!(memory, InMemoryStore::new());
backend_tests!(sqlite, SqliteStore::in_memory().unwrap());

#[test]
fn sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.db");
    let path = path.to_str().unwrap();

    let v = version("greet", "src", 0);
    let inv = invocation(&v.id, "k", vec![]);
    {
        let mut store = SqliteStore::new(path).unwrap();
        store.write_version(&v).unwrap();
        store.write_invocation(&inv).unwrap();
    }

    let store = SqliteStore::new(path).unwrap();
    assert_eq!(store.get_cached(&v.id, "k").unwrap(), vec![inv]);
    assert_eq!(store.get_version(&v.id).unwrap().unwrap().num_invocations, 1);
}

#[test]
fn read_only_store_reads_without_touching_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.db");
    let path = path.to_str().unwrap();

    let v = version("greet", "src", 0);
    {
        let mut store = SqliteStore::new(path).unwrap();
        store.write_version(&v).unwrap();
    }
    let before = std::fs::read(path).unwrap();

    {
        let mut store = SqliteStore::open_read_only(path).unwrap();
        assert_eq!(store.list_program_names().unwrap(), vec!["greet".to_string()]);
        assert!(store.write_version(&version("greet", "other", 1)).is_err());
    }

    assert_eq!(std::fs::read(path).unwrap(), before);
}

#[test]
fn read_only_store_refuses_missing_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.db");
    std::fs::write(&path, b"").unwrap();

    let err = SqliteStore::open_read_only(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, StorageError::Migration(_)));
}
