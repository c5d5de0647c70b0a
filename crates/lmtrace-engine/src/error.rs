//! Engine error taxonomy.
//!
//! [`EngineError`] is what every public engine operation returns. Storage
//! failures are split: [`StorageError::Unavailable`] becomes
//! [`EngineError::StoreUnavailable`], everything else stays wrapped in
//! [`EngineError::Storage`].

use lmtrace_core::CoreError;
use lmtrace_storage::StorageError;
use thiserror::Error;

use crate::program::ProgramError;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The operation needs a persistence backend and none is configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A result (or a tracked argument) is not text or a list of text.
    #[error("type constraint violated: expected text or a list of text, found {found}")]
    TypeConstraint { found: String },

    /// A declared program dependency is not registered.
    #[error("program '{program}' depends on '{dependency}', which is not registered")]
    DependencyResolution { program: String, dependency: String },

    /// The store could not serve a request that had no untracked fallback.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other persistence failure.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// A frozen program had no cached result for the given input.
    #[error("program '{program}' is frozen and has no cached result for this input")]
    CacheMiss { program: String },

    /// The wrapped program returned an error. The original error is kept
    /// as the source.
    #[error("program '{program}' failed: {source}")]
    Program {
        program: String,
        #[source]
        source: ProgramError,
    },

    /// No program with this name is registered.
    #[error("unknown program '{0}'")]
    UnknownProgram(String),

    /// A malformed identifier or argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    /// The wrapped program's own error, if this is a program failure.
    pub fn program_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            EngineError::Program { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(reason) => EngineError::StoreUnavailable(reason),
            other => EngineError::Storage(other),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TypeConstraint { found } => EngineError::TypeConstraint { found },
            other @ CoreError::InvalidId { .. } => EngineError::InvalidInput(other.to_string()),
        }
    }
}
