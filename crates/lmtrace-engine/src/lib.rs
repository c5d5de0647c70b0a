//! Versioning, state fingerprinting and invocation provenance.
//!
//! Hosts declare programs with [`ProgramDef`], register them on a
//! [`Tracer`], and call them through a [`Session`]. Each call is:
//!
//! 1. versioned: the program's source plus its declared dependency closure
//!    hash to a [`VersionId`](lmtrace_core::VersionId) ([`closure`])
//! 2. fingerprinted: arguments and captured state hash to a cache key
//!    ([`fingerprint`])
//! 3. served from the store on a cache hit, or executed and recorded
//!    ([`session`], [`registrar`])
//!
//! Outputs come back as [`Tracked`](lmtrace_core::Tracked) values. Passing
//! one into another program records a consumed-by edge, which
//! [`Tracer::trace`] walks breadth-first up to a configurable depth
//! ([`provenance`]).
//!
//! # Modules
//!
//! - [`config`]: TracerConfig and environment overrides
//! - [`error`]: EngineError taxonomy
//! - [`program`]: program declarations, handles and cache policy
//! - [`closure`]: dependency closure resolution and version ids
//! - [`fingerprint`]: canonical inputs and cache keys
//! - [`diff`]: line diffs used for commit messages
//! - [`registrar`]: version number assignment and persistence
//! - [`session`]: the per-context call stack and recorder
//! - [`provenance`]: bounded traversal of consumed-by edges
//! - [`freeze`]: scoped cache-only mode
//! - [`tracer`]: the entry point tying the pieces together

pub mod closure;
pub mod config;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod freeze;
pub mod program;
pub mod provenance;
pub mod registrar;
mod registry;
pub mod session;
pub mod tracer;

pub use closure::Closure;
pub use config::{ResolutionMode, TracerConfig};
pub use error::EngineError;
pub use fingerprint::Fingerprint;
pub use freeze::FreezeGuard;
pub use program::{CachePolicy, Capture, Dependency, Program, ProgramDef, ProgramError};
pub use provenance::{Direction, TraceEdge};
pub use session::Session;
pub use tracer::Tracer;
