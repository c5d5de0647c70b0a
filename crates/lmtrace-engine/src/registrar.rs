//! Version registration.
//!
//! The first time a version is written, it gets the next dense version
//! number for its qualified name and, when a previous version exists, a
//! commit message diffing the previous `(dependencies, source)` against
//! the new one. Re-registering a stored version id is a no-op.

use lmtrace_core::time::now_iso8601;
use lmtrace_core::ProgramVersion;
use lmtrace_storage::{StorageError, TraceStore};
use tracing::{debug, info, warn};

use crate::closure::Closure;
use crate::diff::commit_message;
use crate::error::EngineError;

/// Registers the version described by `closure` under `name`, returning
/// the stored row (existing or new).
///
/// Callers hold the store lock for the whole call, so the lookup of prior
/// versions and the write are not interleaved with another registration.
pub fn register(
    store: &mut dyn TraceStore,
    name: &str,
    closure: &Closure,
    with_commit_message: bool,
) -> Result<ProgramVersion, EngineError> {
    if let Some(existing) = store.get_version(&closure.version_id)? {
        debug!(program = name, version = existing.version_number, "version already registered");
        return Ok(existing);
    }

    let prior = store.get_versions_by_name(name)?;
    let previous = prior.iter().max_by_key(|v| v.version_number);

    let (version_number, message) = match previous {
        None => (0, None),
        Some(prev) => {
            let message = if with_commit_message {
                diff_message(name, prev, closure)
            } else {
                None
            };
            (prev.version_number + 1, message)
        }
    };

    let version = ProgramVersion {
        id: closure.version_id.clone(),
        name: name.to_string(),
        source: closure.source.clone(),
        dependencies: closure.dependencies.clone(),
        dependency_ids: closure.dependency_ids.clone(),
        initial_globals: closure.globals.clone(),
        initial_free_vars: closure.free_vars.clone(),
        version_number,
        commit_message: message,
        created_at: now_iso8601(),
        num_invocations: 0,
    };

    if store.write_version(&version)? {
        info!(
            program = name,
            version = version_number,
            id = version.id.short(),
            "registered new program version"
        );
        Ok(version)
    } else {
        // Another writer stored the same hash between lookup and write.
        store
            .get_version(&version.id)?
            .ok_or_else(|| StorageError::VersionNotFound(version.id.to_string()).into())
    }
}

fn diff_message(name: &str, prev: &ProgramVersion, closure: &Closure) -> Option<String> {
    let old = format!("{}\n{}", prev.dependencies, prev.source);
    let new = format!("{}\n{}", closure.dependencies, closure.source);
    match commit_message(&old, &new) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(program = name, error = %err, "commit message skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmtrace_core::Value;
    use lmtrace_storage::InMemoryStore;

    use crate::closure::resolve;
    use crate::program::ProgramDef;

    fn closure_for(source: &str) -> Closure {
        let def = ProgramDef::new("greet", source, |_, _| Ok(Value::from("")));
        resolve(&def, &|_| None).unwrap()
    }

    #[test]
    fn first_version_is_zero_without_message() {
        let mut store = InMemoryStore::new();
        let v = register(&mut store, "greet", &closure_for("a"), true).unwrap();
        assert_eq!(v.version_number, 0);
        assert_eq!(v.commit_message, None);
    }

    #[test]
    fn numbers_are_dense() {
        let mut store = InMemoryStore::new();
        for (i, src) in ["a", "b", "c", "d"].iter().enumerate() {
            let v = register(&mut store, "greet", &closure_for(src), true).unwrap();
            assert_eq!(v.version_number as usize, i);
        }
        let numbers: Vec<u32> = store
            .get_versions_by_name("greet")
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
    }

    #[test]
    fn reregistration_is_idempotent() {
        let mut store = InMemoryStore::new();
        let c = closure_for("a");
        let first = register(&mut store, "greet", &c, true).unwrap();
        let second = register(&mut store, "greet", &c, true).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.get_versions_by_name("greet").unwrap().len(), 1);
    }

    #[test]
    fn later_versions_carry_a_diff() {
        let mut store = InMemoryStore::new();
        register(&mut store, "greet", &closure_for("say hello"), true).unwrap();
        let v = register(&mut store, "greet", &closure_for("say hi"), true).unwrap();
        let message = v.commit_message.unwrap();
        assert!(message.starts_with("1 line(s) added, 1 line(s) removed"));
        assert!(message.contains("- say hello"));
        assert!(message.contains("+ say hi"));
    }

    #[test]
    fn commit_messages_can_be_disabled() {
        let mut store = InMemoryStore::new();
        register(&mut store, "greet", &closure_for("a"), false).unwrap();
        let v = register(&mut store, "greet", &closure_for("b"), false).unwrap();
        assert_eq!(v.version_number, 1);
        assert_eq!(v.commit_message, None);
    }

    #[test]
    fn oversized_diff_leaves_message_empty() {
        let mut store = InMemoryStore::new();
        let big_a = "a\n".repeat(2500);
        let big_b = "b\n".repeat(2500);
        register(&mut store, "greet", &closure_for(&big_a), true).unwrap();
        let v = register(&mut store, "greet", &closure_for(&big_b), true).unwrap();
        assert_eq!(v.version_number, 1);
        assert_eq!(v.commit_message, None);
    }
}
