//! Core data model for lmtrace.
//!
//! Identifiers, the host value model with its canonical rendering, and the
//! persisted records ([`ProgramVersion`], [`Invocation`], [`ProvenanceEdge`])
//! shared by the storage and engine crates.

pub mod error;
pub mod id;
pub mod record;
pub mod time;
pub mod value;

// Re-export commonly used types
pub use error::CoreError;
pub use id::{InvocationId, VersionId};
pub use record::{Invocation, ProgramVersion, ProvenanceEdge, Usage};
pub use value::{Args, Tracked, Value};
