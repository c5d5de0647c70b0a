//! Persisted records: program versions, invocations and provenance edges.

use serde::{Deserialize, Serialize};

use crate::id::{InvocationId, VersionId};
use crate::value::Value;

/// One content-addressed version of a program.
///
/// Created at most once per distinct [`VersionId`]; afterwards only
/// `num_invocations` changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramVersion {
    pub id: VersionId,
    /// Qualified name shared by every version of the program.
    pub name: String,
    pub source: String,
    /// Rendered dependency closure, the text hashed alongside `source`.
    pub dependencies: String,
    /// Identifiers of the closure entries in first-seen order, e.g.
    /// `program:helper` or `value:GREETING`.
    pub dependency_ids: Vec<String>,
    /// Canonical snapshot of the declared globals at resolution time.
    pub initial_globals: String,
    /// Canonical snapshot of the declared free variables at resolution time.
    pub initial_free_vars: String,
    /// Dense per-name counter, assigned when the version is first written.
    pub version_number: u32,
    pub commit_message: Option<String>,
    pub created_at: String,
    pub num_invocations: u64,
}

/// Token counters reported by the wrapped model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
    }
}

/// One recorded execution of a [`ProgramVersion`]. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub id: InvocationId,
    pub version_id: VersionId,
    /// State fingerprint the result is cached under.
    pub cache_key: String,
    /// Canonical rendering of the call arguments.
    pub args: String,
    pub latency_ms: f64,
    pub usage: Usage,
    pub created_at: String,
    /// Result payload: a text unit or a list of text units.
    pub result: Value,
    /// The invocation that was active on the caller's stack.
    pub used_by: Option<InvocationId>,
    /// Invocations whose outputs were passed in as arguments.
    pub consumed: Vec<InvocationId>,
}

/// `consumer` read the output of `consumed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvenanceEdge {
    pub consumer: InvocationId,
    pub consumed: InvocationId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut usage = Usage::default();
        usage += Usage {
            prompt_tokens: 10,
            completion_tokens: 4,
        };
        usage += Usage {
            prompt_tokens: 1,
            completion_tokens: 1,
        };
        assert_eq!(usage.prompt_tokens, 11);
        assert_eq!(usage.total_tokens(), 16);
    }

    #[test]
    fn invocation_serde_roundtrip() {
        let inv = Invocation {
            id: InvocationId::new(),
            version_id: VersionId::from_hex_unchecked("00".repeat(32)),
            cache_key: "k".into(),
            args: r#"{"args":[],"kwargs":{}}"#.into(),
            latency_ms: 1.5,
            usage: Usage::default(),
            created_at: "1970-01-01T00:00:00.000Z".into(),
            result: Value::List(vec!["a".into(), "b".into()]),
            used_by: None,
            consumed: vec![InvocationId::new()],
        };
        let json = serde_json::to_string(&inv).unwrap();
        let back: Invocation = serde_json::from_str(&json).unwrap();
        assert_eq!(inv, back);
    }
}
