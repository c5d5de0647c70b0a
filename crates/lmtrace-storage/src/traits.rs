//! The [`TraceStore`] trait defining the persistence contract.
//!
//! The engine only ever talks to this trait, so backends (InMemoryStore,
//! SqliteStore, or a host-supplied one) are swappable without changing
//! core logic. Every write call is atomic on its own; callers serialize
//! access by holding the store behind a lock.

use lmtrace_core::{Invocation, InvocationId, ProgramVersion, ProvenanceEdge, VersionId};

use crate::error::StorageError;

/// The storage contract for versions, invocations and provenance edges.
pub trait TraceStore: Send {
    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    /// Persists a program version.
    ///
    /// Idempotent on the content hash: if a version with the same id is
    /// already stored, nothing is written and `Ok(false)` is returned.
    /// Returns `Ok(true)` when a new row was inserted.
    fn write_version(&mut self, version: &ProgramVersion) -> Result<bool, StorageError>;

    /// Persists an invocation together with its result and consumed edges,
    /// and bumps the owning version's invocation counter.
    ///
    /// The owning version must already be stored.
    fn write_invocation(&mut self, invocation: &Invocation) -> Result<(), StorageError>;

    // -------------------------------------------------------------------
    // Lookups used by the recorder and registrar
    // -------------------------------------------------------------------

    /// Prior invocations recorded under `(version, cache_key)`, oldest
    /// first. Empty if none.
    fn get_cached(
        &self,
        version: &VersionId,
        cache_key: &str,
    ) -> Result<Vec<Invocation>, StorageError>;

    /// All versions sharing a qualified name, ordered by version number.
    fn get_versions_by_name(&self, name: &str) -> Result<Vec<ProgramVersion>, StorageError>;

    /// A single version by id.
    fn get_version(&self, id: &VersionId) -> Result<Option<ProgramVersion>, StorageError>;

    // -------------------------------------------------------------------
    // Provenance
    // -------------------------------------------------------------------

    /// Edges from `invocation` to every invocation it consumed, in the
    /// order the consumed ids were recorded.
    fn get_provenance_edges(
        &self,
        invocation: InvocationId,
    ) -> Result<Vec<ProvenanceEdge>, StorageError>;

    /// Edges from every invocation that consumed `invocation`, oldest
    /// consumer first.
    fn get_consumer_edges(
        &self,
        invocation: InvocationId,
    ) -> Result<Vec<ProvenanceEdge>, StorageError>;

    // -------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------

    /// A single invocation by id.
    fn get_invocation(&self, id: InvocationId) -> Result<Option<Invocation>, StorageError>;

    /// Every invocation of a version, oldest first.
    fn list_invocations(&self, version: &VersionId) -> Result<Vec<Invocation>, StorageError>;

    /// Distinct qualified names with at least one stored version, sorted.
    fn list_program_names(&self) -> Result<Vec<String>, StorageError>;
}
