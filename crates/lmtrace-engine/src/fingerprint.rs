//! State fingerprinting.
//!
//! The cache key of a call is the blake3 hash of the canonical arguments
//! and the canonical global and free-variable snapshots. Tracked arguments
//! render as reference tokens, and their origins are collected into the
//! consumed set that becomes the call's provenance edges.

use lmtrace_core::{Args, InvocationId};
use lmtrace_storage::hash_state;

use crate::error::EngineError;

/// Fingerprint of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub cache_key: String,
    /// Canonical arguments, stored on the invocation.
    pub inputs: String,
    /// Origins of tracked arguments, first-seen order.
    pub consumed: Vec<InvocationId>,
}

/// Computes the fingerprint of `args` under the rendered snapshots.
///
/// Fails with [`EngineError::TypeConstraint`] if a tracked argument does
/// not carry a text or list-of-text payload.
pub fn fingerprint(args: &Args, globals: &str, free_vars: &str) -> Result<Fingerprint, EngineError> {
    let inputs = args.to_canonical()?.to_string();
    let cache_key = hash_state(&inputs, globals, free_vars);
    Ok(Fingerprint {
        cache_key,
        inputs,
        consumed: args.origins().into_iter().collect(),
    })
}
