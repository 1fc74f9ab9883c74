//! Cross-entity quick search.
//!
//! # Responsibility
//! - Describe which entities are searchable and on which fields.
//! - Fan one free-text value out over those entities and merge the results.
//!
//! # Invariants
//! - Entities declaring no quick-filter field are skipped, never reported.
//! - An unknown requested entity yields an empty result, not an error.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod aggregator;
pub mod entity;

pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for entity declarations and DB interaction.
#[derive(Debug)]
pub enum SearchError {
    /// Entity declaration names a table or column that cannot be queried.
    InvalidEntity {
        entity: String,
        message: String,
    },
    Db(DbError),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEntity { entity, message } => {
                write!(f, "invalid searchable entity `{entity}`: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidEntity { .. } => None,
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for SearchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
