//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the admin core.
//! - Apply schema migrations in deterministic order.
//! - Classify transient lock conflicts for the single-retry policy.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No inbox or directory table is touched before migrations succeed.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod functions;
pub mod migrations;
mod open;

pub(crate) use functions::CONTAINS_CI_FUNCTION;
pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

static SQL_IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier regex"));

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// Whether this error is a lock conflict that may succeed when retried.
    pub fn is_transient_conflict(&self) -> bool {
        match self {
            Self::Sqlite(err) => is_transient_sqlite_error(err),
            Self::UnsupportedSchemaVersion { .. } => false,
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Busy/locked failures are the only conflict class worth a retry.
pub(crate) fn is_transient_sqlite_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

/// Whether `value` may be spliced into SQL as a table or column name.
pub(crate) fn is_safe_identifier(value: &str) -> bool {
    SQL_IDENTIFIER_RE.is_match(value)
}
