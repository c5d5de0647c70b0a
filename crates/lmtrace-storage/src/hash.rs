//! Deterministic content hashing using blake3.
//!
//! Hashes are derived state: a version id is recomputed from a program's
//! source and rendered closure, and a cache key from the rendered call
//! state. Both are hex-encoded 32-byte digests.
//!
//! Each part is fed to the hasher followed by a NUL separator so that
//! moving text across a part boundary changes the digest.

use lmtrace_core::VersionId;

/// Computes the version id of a program from its source text and the
/// rendered dependency closure.
pub fn hash_version(source: &str, dependencies: &str) -> VersionId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source.as_bytes());
    hasher.update(&[0]);
    hasher.update(dependencies.as_bytes());
    VersionId::from_hex_unchecked(hasher.finalize().to_hex().to_string())
}

/// Computes the cache key for one call from the rendered inputs and the
/// rendered global and free-variable snapshots.
pub fn hash_state(inputs: &str, globals: &str, free_vars: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [inputs, globals, free_vars] {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_hash_deterministic() {
        let a = hash_version("fn greet(name)", "");
        let b = hash_version("fn greet(name)", "");
        assert_eq!(a, b, "Same program must produce same hash");
        assert_eq!(a.as_str().len(), 64);
        assert!(VersionId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn version_hash_changes_on_source_change() {
        let a = hash_version("fn greet(name)", "");
        let b = hash_version("fn greet(nam)", "");
        assert_ne!(a, b, "Different source must produce different hashes");
    }

    #[test]
    fn version_hash_changes_on_dependency_change() {
        let a = hash_version("src", "program:helper v1");
        let b = hash_version("src", "program:helper v2");
        assert_ne!(a, b);
    }

    #[test]
    fn parts_do_not_bleed_across_boundaries() {
        assert_ne!(hash_version("ab", "c"), hash_version("a", "bc"));
        assert_ne!(hash_state("a", "b", ""), hash_state("ab", "", ""));
    }

    #[test]
    fn state_hash_deterministic() {
        let a = hash_state(r#"{"args":[1]}"#, "{}", "{}");
        let b = hash_state(r#"{"args":[1]}"#, "{}", "{}");
        assert_eq!(a, b);
        assert_ne!(a, hash_state(r#"{"args":[2]}"#, "{}", "{}"));
    }
}
