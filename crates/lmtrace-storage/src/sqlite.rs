//! SQLite implementation of [`TraceStore`].
//!
//! [`SqliteStore`] persists versions, invocations and consumed edges in a
//! SQLite database with WAL mode, a transaction around every write, and
//! automatic schema migrations. Structured fields (dependency id lists,
//! result payloads) are stored as JSON TEXT columns via serde_json.

use rusqlite::{params, Connection, OptionalExtension, Row};

use lmtrace_core::{
    Invocation, InvocationId, ProgramVersion, ProvenanceEdge, Usage, Value, VersionId,
};

use crate::error::StorageError;
use crate::traits::TraceStore;

const VERSION_COLUMNS: &str = "version_id, name, source, dependencies, dependency_ids_json, initial_globals, initial_free_vars, version_number, commit_message, created_at, num_invocations";

const INVOCATION_COLUMNS: &str = "invocation_id, version_id, cache_key, args, latency_ms, prompt_tokens, completion_tokens, created_at, result_json, used_by";

/// Raw `program_versions` row, decoded outside the rusqlite row closure so
/// JSON errors surface as [`StorageError::Serialization`].
struct VersionRow {
    id: String,
    name: String,
    source: String,
    dependencies: String,
    dependency_ids_json: String,
    initial_globals: String,
    initial_free_vars: String,
    version_number: u32,
    commit_message: Option<String>,
    created_at: String,
    num_invocations: i64,
}

impl VersionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(VersionRow {
            id: row.get(0)?,
            name: row.get(1)?,
            source: row.get(2)?,
            dependencies: row.get(3)?,
            dependency_ids_json: row.get(4)?,
            initial_globals: row.get(5)?,
            initial_free_vars: row.get(6)?,
            version_number: row.get(7)?,
            commit_message: row.get(8)?,
            created_at: row.get(9)?,
            num_invocations: row.get(10)?,
        })
    }

    fn into_version(self) -> Result<ProgramVersion, StorageError> {
        Ok(ProgramVersion {
            id: VersionId::parse(&self.id)?,
            name: self.name,
            source: self.source,
            dependencies: self.dependencies,
            dependency_ids: serde_json::from_str(&self.dependency_ids_json)?,
            initial_globals: self.initial_globals,
            initial_free_vars: self.initial_free_vars,
            version_number: self.version_number,
            commit_message: self.commit_message,
            created_at: self.created_at,
            num_invocations: self.num_invocations.max(0) as u64,
        })
    }
}

/// Raw `invocations` row. Consumed ids live in a separate table and are
/// attached afterwards.
struct InvocationRow {
    id: String,
    version_id: String,
    cache_key: String,
    args: String,
    latency_ms: f64,
    prompt_tokens: i64,
    completion_tokens: i64,
    created_at: String,
    result_json: String,
    used_by: Option<String>,
}

impl InvocationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(InvocationRow {
            id: row.get(0)?,
            version_id: row.get(1)?,
            cache_key: row.get(2)?,
            args: row.get(3)?,
            latency_ms: row.get(4)?,
            prompt_tokens: row.get(5)?,
            completion_tokens: row.get(6)?,
            created_at: row.get(7)?,
            result_json: row.get(8)?,
            used_by: row.get(9)?,
        })
    }
}

/// SQLite-backed implementation of [`TraceStore`].
///
/// Every write operation is wrapped in a transaction for atomicity.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an existing store for inspection. Writes through this handle
    /// fail; opening it never touches the file.
    pub fn open_read_only(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_read_only(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn query_versions(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ProgramVersion>, StorageError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, VersionRow::from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_version()?);
        }
        Ok(result)
    }

    fn query_invocations(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Invocation>, StorageError> {
        let raw: Vec<InvocationRow> = {
            let mut stmt = self.conn.prepare_cached(sql)?;
            let rows = stmt.query_map(params, InvocationRow::from_row)?;
            rows.collect::<Result<_, _>>()?
        };
        raw.into_iter().map(|row| self.hydrate(row)).collect()
    }

    /// Decodes a raw row and attaches its consumed ids.
    fn hydrate(&self, row: InvocationRow) -> Result<Invocation, StorageError> {
        let id = InvocationId::parse(&row.id)?;
        let consumed = self
            .get_provenance_edges(id)?
            .into_iter()
            .map(|edge| edge.consumed)
            .collect();
        let result: Value = serde_json::from_str(&row.result_json)?;
        Ok(Invocation {
            id,
            version_id: VersionId::parse(&row.version_id)?,
            cache_key: row.cache_key,
            args: row.args,
            latency_ms: row.latency_ms,
            usage: Usage {
                prompt_tokens: row.prompt_tokens.max(0) as u64,
                completion_tokens: row.completion_tokens.max(0) as u64,
            },
            created_at: row.created_at,
            result,
            used_by: row.used_by.as_deref().map(InvocationId::parse).transpose()?,
            consumed,
        })
    }

    fn query_edges(
        &self,
        sql: &str,
        invocation: InvocationId,
    ) -> Result<Vec<ProvenanceEdge>, StorageError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![invocation.to_string()], |row| {
            let consumer: String = row.get(0)?;
            let consumed: String = row.get(1)?;
            Ok((consumer, consumed))
        })?;
        let mut result = Vec::new();
        for row in rows {
            let (consumer, consumed) = row?;
            result.push(ProvenanceEdge {
                consumer: InvocationId::parse(&consumer)?,
                consumed: InvocationId::parse(&consumed)?,
            });
        }
        Ok(result)
    }
}

impl TraceStore for SqliteStore {
    fn write_version(&mut self, version: &ProgramVersion) -> Result<bool, StorageError> {
        let tx = self.conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM program_versions WHERE version_id = ?1)",
            params![version.id.as_str()],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(false);
        }
        let dependency_ids_json = serde_json::to_string(&version.dependency_ids)?;
        tx.execute(
            &format!(
                "INSERT INTO program_versions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                VERSION_COLUMNS
            ),
            params![
                version.id.as_str(),
                version.name,
                version.source,
                version.dependencies,
                dependency_ids_json,
                version.initial_globals,
                version.initial_free_vars,
                version.version_number,
                version.commit_message,
                version.created_at,
                version.num_invocations as i64,
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn write_invocation(&mut self, invocation: &Invocation) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE program_versions SET num_invocations = num_invocations + 1 WHERE version_id = ?1",
            params![invocation.version_id.as_str()],
        )?;
        if updated == 0 {
            return Err(StorageError::VersionNotFound(
                invocation.version_id.to_string(),
            ));
        }

        let result_json = serde_json::to_string(&invocation.result)?;
        tx.execute(
            &format!(
                "INSERT INTO invocations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                INVOCATION_COLUMNS
            ),
            params![
                invocation.id.to_string(),
                invocation.version_id.as_str(),
                invocation.cache_key,
                invocation.args,
                invocation.latency_ms,
                invocation.usage.prompt_tokens as i64,
                invocation.usage.completion_tokens as i64,
                invocation.created_at,
                result_json,
                invocation.used_by.map(|id| id.to_string()),
            ],
        )?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO consumptions (consumer, consumed, ordinal) VALUES (?1, ?2, ?3)",
            )?;
            for (ordinal, consumed) in invocation.consumed.iter().enumerate() {
                stmt.execute(params![
                    invocation.id.to_string(),
                    consumed.to_string(),
                    ordinal as i64,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn get_cached(
        &self,
        version: &VersionId,
        cache_key: &str,
    ) -> Result<Vec<Invocation>, StorageError> {
        self.query_invocations(
            &format!(
                "SELECT {} FROM invocations WHERE version_id = ?1 AND cache_key = ?2 ORDER BY seq",
                INVOCATION_COLUMNS
            ),
            params![version.as_str(), cache_key],
        )
    }

    fn get_versions_by_name(&self, name: &str) -> Result<Vec<ProgramVersion>, StorageError> {
        self.query_versions(
            &format!(
                "SELECT {} FROM program_versions WHERE name = ?1 ORDER BY version_number",
                VERSION_COLUMNS
            ),
            params![name],
        )
    }

    fn get_version(&self, id: &VersionId) -> Result<Option<ProgramVersion>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM program_versions WHERE version_id = ?1",
                    VERSION_COLUMNS
                ),
                params![id.as_str()],
                VersionRow::from_row,
            )
            .optional()?;
        row.map(VersionRow::into_version).transpose()
    }

    fn get_provenance_edges(
        &self,
        invocation: InvocationId,
    ) -> Result<Vec<ProvenanceEdge>, StorageError> {
        self.query_edges(
            "SELECT consumer, consumed FROM consumptions WHERE consumer = ?1 ORDER BY ordinal",
            invocation,
        )
    }

    fn get_consumer_edges(
        &self,
        invocation: InvocationId,
    ) -> Result<Vec<ProvenanceEdge>, StorageError> {
        self.query_edges(
            "SELECT c.consumer, c.consumed FROM consumptions c JOIN invocations i ON i.invocation_id = c.consumer WHERE c.consumed = ?1 ORDER BY i.seq",
            invocation,
        )
    }

    fn get_invocation(&self, id: InvocationId) -> Result<Option<Invocation>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM invocations WHERE invocation_id = ?1",
                    INVOCATION_COLUMNS
                ),
                params![id.to_string()],
                InvocationRow::from_row,
            )
            .optional()?;
        row.map(|r| self.hydrate(r)).transpose()
    }

    fn list_invocations(&self, version: &VersionId) -> Result<Vec<Invocation>, StorageError> {
        self.query_invocations(
            &format!(
                "SELECT {} FROM invocations WHERE version_id = ?1 ORDER BY seq",
                INVOCATION_COLUMNS
            ),
            params![version.as_str()],
        )
    }

    fn list_program_names(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT name FROM program_versions ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}
