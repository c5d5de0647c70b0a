//! Trace store schema and connection setup.
//!
//! Three tables: `program_versions` (one row per content hash),
//! `invocations` (one row per recorded call, ordered by `seq`) and
//! `consumptions` (consumed-by edges). The schema version lives in SQLite's
//! `user_version` and is advanced by `rusqlite_migration`.
//!
//! Writers open with [`open_database`], which migrates. Inspection tools
//! open with [`open_read_only`], which never writes to the file and
//! refuses a database whose schema is not the current one.

use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use rusqlite_migration::{Migrations, M};

use crate::error::StorageError;

/// Wait on a locked database this long before reporting it unavailable.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MIGRATION_SOURCES: &[&str] = &[include_str!("migrations/001_initial_schema.sql")];

fn migrations() -> Migrations<'static> {
    Migrations::new(MIGRATION_SOURCES.iter().map(|sql| M::up(sql)).collect())
}

/// Opens or creates the trace store at `path` and brings its schema up to
/// date.
pub fn open_database(path: &str) -> Result<Connection, StorageError> {
    let mut conn = Connection::open(path)?;
    prepare_writer(&mut conn)?;
    Ok(conn)
}

/// A private in-memory trace store.
pub fn open_in_memory() -> Result<Connection, StorageError> {
    let mut conn = Connection::open_in_memory()?;
    prepare_writer(&mut conn)?;
    Ok(conn)
}

/// Opens an existing trace store without modifying it.
///
/// Fails with [`StorageError::Migration`] when the file was never
/// initialised or was written by a different schema version.
pub fn open_read_only(path: &str) -> Result<Connection, StorageError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    let found: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let expected = MIGRATION_SOURCES.len() as i64;
    if found != expected {
        return Err(StorageError::Migration(format!(
            "'{}' has schema version {}, expected {}",
            path, found, expected
        )));
    }
    Ok(conn)
}

fn prepare_writer(conn: &mut Connection) -> Result<(), StorageError> {
    // WAL lets inspection tools read while a host application records.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // consumptions.consumer must point at a stored invocation.
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    migrations()
        .to_latest(conn)
        .map_err(|e| StorageError::Migration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn fresh_store_has_trace_tables() {
        let conn = open_in_memory().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["consumptions", "invocations", "program_versions"]);
    }

    #[test]
    fn read_only_rejects_uninitialised_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.db");
        Connection::open(&path).unwrap();
        let err = open_read_only(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, StorageError::Migration(_)));
    }

    #[test]
    fn read_only_opens_migrated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.db");
        let path = path.to_str().unwrap();
        drop(open_database(path).unwrap());
        let conn = open_read_only(path).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM program_versions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 0);
    }
}
