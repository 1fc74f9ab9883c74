//! Scalar SQL functions registered on every connection.
//!
//! # Invariants
//! - `contains_ci(haystack, needle)` folds case with full Unicode rules,
//!   unlike SQLite's `LIKE`, which only folds ASCII.
//! - A `NULL` or blob haystack never matches.

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

pub(crate) const CONTAINS_CI_FUNCTION: &str = "contains_ci";

pub(crate) fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        CONTAINS_CI_FUNCTION,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let needle = match ctx.get_raw(1) {
                ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                _ => return Ok(false),
            };
            let matched = match ctx.get_raw(0) {
                ValueRef::Text(bytes) => contains_ci(&String::from_utf8_lossy(bytes), &needle),
                ValueRef::Integer(number) => contains_ci(&number.to_string(), &needle),
                ValueRef::Real(number) => contains_ci(&number.to_string(), &needle),
                ValueRef::Null | ValueRef::Blob(_) => false,
            };
            Ok(matched)
        },
    )
}

/// Case-insensitive substring test.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::{contains_ci, register_functions};
    use rusqlite::{params, Connection};

    #[test]
    fn folds_non_ascii_case() {
        assert!(contains_ci("Ärztekammer Zürich", "ärztekammer"));
        assert!(contains_ci("ÄNDERUNG", "änderung"));
        assert!(!contains_ci("Globex", "acme"));
    }

    #[test]
    fn sql_function_matches_literally_and_skips_null() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();
        let check = |haystack: Option<&str>, needle: &str| -> bool {
            conn.query_row(
                "SELECT contains_ci(?1, ?2);",
                params![haystack, needle],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert!(check(Some("Straße Ölwerk"), "ÖLWERK"));
        assert!(!check(Some("50 off"), "50%"));
        assert!(!check(None, "x"));
    }
}
