//! Core error types for lmtrace-core.

use thiserror::Error;

/// Errors produced by the core data model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A program result (or a tracked value standing in for one) was not a
    /// single text unit or an ordered sequence of text units.
    #[error("type constraint violated: expected text or a list of text, found {found}")]
    TypeConstraint { found: String },

    /// An identifier string could not be parsed.
    #[error("invalid {kind} id: '{value}'")]
    InvalidId { kind: &'static str, value: String },
}
