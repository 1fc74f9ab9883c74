//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQL details from processor and service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `AlreadyTerminal`,
//!   `InvalidFilter`) in addition to DB transport errors.
//! - Repositories borrow a `Connection`, so they work unchanged inside a
//!   `Transaction` (which derefs to one).

use crate::db::DbError;
use crate::model::inbox::{InboxEntryId, InboxStatus, InboxValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod directory_repo;
pub mod inbox_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by inbox and directory persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(InboxValidationError),
    Db(DbError),
    NotFound {
        entity: &'static str,
        id: i64,
    },
    /// Mutation attempted on an inbox entry that already reached a final state.
    AlreadyTerminal {
        id: InboxEntryId,
        status: InboxStatus,
    },
    /// Listing filter key outside the allow-list.
    InvalidFilter(String),
    InvalidData(String),
}

impl RepoError {
    /// Whether the failure is a lock conflict worth one more attempt.
    pub fn is_transient_conflict(&self) -> bool {
        match self {
            Self::Db(err) => err.is_transient_conflict(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::AlreadyTerminal { id, status } => {
                write!(f, "inbox entry {id} is already {status}")
            }
            Self::InvalidFilter(key) => write!(f, "unsupported filter `{key}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InboxValidationError> for RepoError {
    fn from(value: InboxValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
