//! Persistence backends for lmtrace.
//!
//! Provides the [`TraceStore`] trait defining the storage contract that all
//! backends implement, plus [`InMemoryStore`] and [`SqliteStore`] as
//! first-class backends.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`hash`]: blake3 content hashing for version ids and cache keys
//! - [`traits`]: TraceStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL migrations and connection setup
//! - [`sqlite`]: SqliteStore implementation

pub mod error;
pub mod hash;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use hash::{hash_state, hash_version};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::TraceStore;
