//! Inbox store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist pending change-requests and their lifecycle transitions.
//! - Own the filter allow-list and quick-filter semantics for listings.
//!
//! # Invariants
//! - Status transitions only ever leave `pending`; the guard lives in the
//!   `UPDATE` itself so two racing writers cannot both succeed.
//! - Listings are ordered by `id DESC`.
//! - Filter keys outside `INBOX_FILTER_FIELDS` are rejected, never ignored.

use crate::db::CONTAINS_CI_FUNCTION;
use crate::model::inbox::{InboxEntry, InboxEntryId, InboxStatus, NewInboxEntry};
use crate::repo::{RepoError, RepoResult};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Fields accepted as exact/wildcard listing filters.
pub const INBOX_FILTER_FIELDS: &[&str] = &["scope", "action", "title", "origin", "comment"];
/// Fields searched by the free-text quick filter.
pub const INBOX_QUICK_FILTER_FIELDS: &[&str] = &["scope", "action", "title", "comment"];
/// Fields offered as one-click context filters.
pub const INBOX_CONTEXT_FILTER_FIELDS: &[&str] = &["scope", "action"];

const INBOX_SELECT_SQL: &str = "SELECT
    i.id AS id,
    i.uuid AS uuid,
    i.scope AS scope,
    i.action AS action,
    i.title AS title,
    i.origin AS origin,
    i.comment AS comment,
    i.data AS data,
    i.status AS status,
    i.user_id AS user_id,
    u.username AS creator_username,
    i.created_at AS created_at,
    i.modified_at AS modified_at
FROM inbox i
LEFT JOIN users u ON u.id = i.user_id";

/// Listing options for inbox entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxListQuery {
    /// Field -> value. A value containing `%` is matched with `LIKE`.
    pub filters: BTreeMap<String, String>,
    /// Case-insensitive substring over `INBOX_QUICK_FILTER_FIELDS`.
    pub quick_filter: Option<String>,
    pub status: Option<InboxStatus>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl InboxListQuery {
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }
}

/// Persistence contract for inbox entries.
pub trait InboxStore {
    fn create(&self, entry: &NewInboxEntry) -> RepoResult<InboxEntry>;
    fn get(&self, id: InboxEntryId) -> RepoResult<InboxEntry>;
    fn list(&self, query: &InboxListQuery) -> RepoResult<Vec<InboxEntry>>;
    /// Counts rows matching the query, ignoring pagination.
    fn count(&self, query: &InboxListQuery) -> RepoResult<u64>;
    fn mark_applied(&self, id: InboxEntryId) -> RepoResult<()>;
    fn mark_discarded(&self, id: InboxEntryId) -> RepoResult<()>;
    /// Distinct values of one context filter field, sorted.
    fn context_values(&self, field: &str) -> RepoResult<Vec<String>>;
}

/// SQLite-backed inbox store.
pub struct SqliteInboxStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteInboxStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn transition(&self, id: InboxEntryId, target: InboxStatus) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE inbox
             SET
                status = ?1,
                modified_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?2
               AND status = 'pending';",
            params![target.as_str(), id],
        )?;
        if changed == 1 {
            debug!(
                "event=inbox_transition module=repo status=ok id={} target={}",
                id, target
            );
            return Ok(());
        }

        let current = self
            .conn
            .query_row("SELECT status FROM inbox WHERE id = ?1;", [id], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        match current {
            None => Err(RepoError::NotFound { entity: "inbox entry", id }),
            Some(text) => Err(RepoError::AlreadyTerminal {
                id,
                status: parse_status(&text)?,
            }),
        }
    }
}

impl InboxStore for SqliteInboxStore<'_> {
    fn create(&self, entry: &NewInboxEntry) -> RepoResult<InboxEntry> {
        entry.validate()?;

        self.conn.execute(
            "INSERT INTO inbox (
                uuid,
                scope,
                action,
                title,
                origin,
                comment,
                data,
                status,
                user_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8);",
            params![
                Uuid::new_v4().to_string(),
                entry.scope.trim(),
                entry.action.trim(),
                entry.title.trim(),
                entry.origin.as_str(),
                entry.comment.as_deref(),
                entry.payload.to_string(),
                entry.creator_ref,
            ],
        )?;

        self.get(self.conn.last_insert_rowid())
    }

    fn get(&self, id: InboxEntryId) -> RepoResult<InboxEntry> {
        let mut stmt = self
            .conn
            .prepare(&format!("{INBOX_SELECT_SQL} WHERE i.id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => parse_inbox_row(row),
            None => Err(RepoError::NotFound { entity: "inbox entry", id }),
        }
    }

    fn list(&self, query: &InboxListQuery) -> RepoResult<Vec<InboxEntry>> {
        let (where_sql, mut bind_values) = build_where_clause(query)?;
        let mut sql = format!("{INBOX_SELECT_SQL}{where_sql} ORDER BY i.id DESC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_inbox_row(row)?);
        }
        Ok(entries)
    }

    fn count(&self, query: &InboxListQuery) -> RepoResult<u64> {
        let (where_sql, bind_values) = build_where_clause(query)?;
        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM inbox i{where_sql};"),
            params_from_iter(bind_values),
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }

    fn mark_applied(&self, id: InboxEntryId) -> RepoResult<()> {
        self.transition(id, InboxStatus::Applied)
    }

    fn mark_discarded(&self, id: InboxEntryId) -> RepoResult<()> {
        self.transition(id, InboxStatus::Discarded)
    }

    fn context_values(&self, field: &str) -> RepoResult<Vec<String>> {
        let Some(column) = INBOX_CONTEXT_FILTER_FIELDS
            .iter()
            .find(|candidate| **candidate == field)
        else {
            return Err(RepoError::InvalidFilter(field.to_string()));
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT {column} FROM inbox ORDER BY {column} ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            values.push(row.get(0)?);
        }
        Ok(values)
    }
}

/// Validates filter keys and renders the shared `WHERE` clause.
fn build_where_clause(query: &InboxListQuery) -> RepoResult<(String, Vec<Value>)> {
    let mut sql = String::from(" WHERE 1 = 1");
    let mut bind_values: Vec<Value> = Vec::new();

    for (field, value) in &query.filters {
        let Some(column) = INBOX_FILTER_FIELDS
            .iter()
            .find(|candidate| **candidate == field.as_str())
        else {
            return Err(RepoError::InvalidFilter(field.clone()));
        };
        if value.contains('%') {
            sql.push_str(&format!(" AND i.{column} LIKE ?"));
        } else {
            sql.push_str(&format!(" AND i.{column} = ?"));
        }
        bind_values.push(Value::Text(value.clone()));
    }

    if let Some(status) = query.status {
        sql.push_str(" AND i.status = ?");
        bind_values.push(Value::Text(status.as_str().to_string()));
    }

    if let Some(needle) = query
        .quick_filter
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let clauses = INBOX_QUICK_FILTER_FIELDS
            .iter()
            .map(|column| format!("{CONTAINS_CI_FUNCTION}(i.{column}, ?)"))
            .collect::<Vec<_>>();
        sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        for _ in INBOX_QUICK_FILTER_FIELDS {
            bind_values.push(Value::Text(needle.to_string()));
        }
    }

    Ok((sql, bind_values))
}

fn parse_inbox_row(row: &Row<'_>) -> RepoResult<InboxEntry> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in inbox.uuid"))
    })?;

    let data_text: String = row.get("data")?;
    let payload = serde_json::from_str(&data_text)
        .map_err(|err| RepoError::InvalidData(format!("invalid json in inbox.data: {err}")))?;

    let status_text: String = row.get("status")?;

    Ok(InboxEntry {
        id: row.get("id")?,
        uuid,
        scope: row.get("scope")?,
        action: row.get("action")?,
        title: row.get("title")?,
        origin: row.get("origin")?,
        comment: row.get("comment")?,
        payload,
        status: parse_status(&status_text)?,
        creator_ref: row.get("user_id")?,
        creator_username: row.get("creator_username")?,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
    })
}

fn parse_status(value: &str) -> RepoResult<InboxStatus> {
    InboxStatus::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{value}` in inbox.status"))
    })
}
