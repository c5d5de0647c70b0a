//! Trace store inspection CLI.
//!
//! Provides the `lmtrace` binary for reading a SQLite trace store written
//! by a host application: version history, invocations and provenance.
//! The store is opened read-only. Every command prints JSON to stdout.
//!
//! Reads configuration from environment variables:
//! - `LMTRACE_DB_PATH`: store path when `--db` is not given (default: "lmtrace.db")
//! - `LMTRACE_PROVENANCE_DEPTH`: default `trace` depth (default: 4)
//!
//! Exit codes: 0 = success, 1 = not found or bad input, 3 = storage error.

use std::path::Path;
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use lmtrace_core::{InvocationId, VersionId};
use lmtrace_engine::provenance::{self, Direction};
use lmtrace_engine::TracerConfig;
use lmtrace_storage::{SqliteStore, StorageError, TraceStore};

/// Inspect recorded program versions and invocations.
#[derive(Parser)]
#[command(name = "lmtrace", about = "Inspect a program trace store")]
struct Cli {
    /// Path to the trace database file.
    #[arg(short, long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every version of a program, oldest first.
    Versions {
        /// Qualified program name.
        name: String,
    },
    /// Show a single version.
    Show {
        /// Version id (64 hex characters).
        version: String,
    },
    /// List the invocations of a version, oldest first.
    Invocations {
        /// Version id (64 hex characters).
        version: String,
    },
    /// Walk provenance edges from an invocation.
    Trace {
        /// Invocation id.
        invocation: String,

        /// Maximum number of hops.
        #[arg(long)]
        depth: Option<usize>,

        /// Follow consumers instead of consumed inputs.
        #[arg(long)]
        downstream: bool,
    },
    /// List the names of all recorded programs.
    Programs,
}

/// A command failure with its exit code.
enum Failure {
    BadInput(String),
    NotFound(String),
    Storage(StorageError),
}

impl Failure {
    fn exit_code(&self) -> i32 {
        match self {
            Failure::BadInput(_) | Failure::NotFound(_) => 1,
            Failure::Storage(_) => 3,
        }
    }
}

impl From<StorageError> for Failure {
    fn from(err: StorageError) -> Self {
        Failure::Storage(err)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::BadInput(msg) => write!(f, "{}", msg),
            Failure::NotFound(msg) => write!(f, "not found: {}", msg),
            Failure::Storage(err) => write!(f, "{}", err),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(|| {
        std::env::var("LMTRACE_DB_PATH").unwrap_or_else(|_| "lmtrace.db".to_string())
    });

    let exit_code = match run(&db_path, cli.command) {
        Ok(()) => 0,
        Err(failure) => {
            eprintln!("Error: {}", failure);
            failure.exit_code()
        }
    };
    process::exit(exit_code);
}

fn run(db_path: &str, command: Commands) -> Result<(), Failure> {
    if !Path::new(db_path).exists() {
        return Err(Failure::NotFound(format!("database '{}'", db_path)));
    }
    // Inspection never migrates or writes the file.
    let store = SqliteStore::open_read_only(db_path)?;
    tracing::debug!(db = db_path, "opened trace store");

    match command {
        Commands::Versions { name } => {
            let versions = store.get_versions_by_name(&name)?;
            if versions.is_empty() {
                return Err(Failure::NotFound(format!("program '{}'", name)));
            }
            print_json(&versions)
        }
        Commands::Show { version } => {
            let id = parse_version(&version)?;
            match store.get_version(&id)? {
                Some(found) => print_json(&found),
                None => Err(Failure::NotFound(format!("version {}", id))),
            }
        }
        Commands::Invocations { version } => {
            let id = parse_version(&version)?;
            if store.get_version(&id)?.is_none() {
                return Err(Failure::NotFound(format!("version {}", id)));
            }
            print_json(&store.list_invocations(&id)?)
        }
        Commands::Trace {
            invocation,
            depth,
            downstream,
        } => {
            let id = InvocationId::parse(&invocation)
                .map_err(|e| Failure::BadInput(e.to_string()))?;
            if store.get_invocation(id)?.is_none() {
                return Err(Failure::NotFound(format!("invocation {}", id)));
            }
            let depth = depth.unwrap_or_else(|| TracerConfig::from_env().provenance_depth);
            let direction = if downstream {
                Direction::Downstream
            } else {
                Direction::Upstream
            };
            print_json(&provenance::trace(&store, id, direction, depth)?)
        }
        Commands::Programs => print_json(&store.list_program_names()?),
    }
}

fn parse_version(raw: &str) -> Result<VersionId, Failure> {
    VersionId::parse(raw).map_err(|e| Failure::BadInput(e.to_string()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Failure> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Failure::Storage(StorageError::Serialization(e)))?;
    println!("{}", json);
    Ok(())
}
