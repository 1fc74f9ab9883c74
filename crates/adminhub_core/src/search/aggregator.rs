//! Multi-entity quick-search aggregator.
//!
//! # Invariants
//! - Matching is a case-insensitive substring test OR-ed across the entity's
//!   quick-filter fields.
//! - Count and fetch for one entity run inside one read transaction, so the
//!   total and the returned rows come from the same snapshot.
//! - Matches are returned in primary-key order unless the entity declares
//!   an ordering.

use crate::db::{is_safe_identifier, CONTAINS_CI_FUNCTION};
use crate::search::entity::{builtin_entity, QuickFilterSpec, SearchableEntity};
use crate::search::{SearchError, SearchResult};
use log::{debug, info, warn};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_SEARCH_LIMIT: u32 = 5;

/// One matched row; contained records are nested under their contain name.
pub type SearchRecord = Map<String, Value>;

/// Matches for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySearchResult {
    pub entity_name: String,
    /// Total number of matches, independent of the fetch limit.
    pub total_count: u64,
    pub entries: Vec<SearchRecord>,
}

/// Fans one value out over the configured searchable entities.
pub struct SearchAggregator {
    entities: Vec<Arc<dyn SearchableEntity>>,
    default_limit: u32,
}

impl SearchAggregator {
    pub fn new(entities: Vec<Arc<dyn SearchableEntity>>) -> Self {
        Self {
            entities,
            default_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Builds an aggregator over built-in entity declarations.
    ///
    /// Names without a built-in declaration are dropped with a warning.
    pub fn from_names(names: &[String]) -> Self {
        let entities = names
            .iter()
            .filter_map(|name| {
                let entity = builtin_entity(name);
                if entity.is_none() {
                    warn!(
                        "event=search_config module=search status=error entity={name} \
                         error_code=unknown_entity"
                    );
                }
                entity
            })
            .collect();
        Self::new(entities)
    }

    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn entity_names(&self) -> Vec<&str> {
        self.entities
            .iter()
            .map(|entity| entity.entity_name())
            .collect()
    }

    /// Searches `value` across all entities, or only `entity_name`.
    ///
    /// Returns an empty map for blank values and for entities outside the
    /// configured set.
    pub fn search_all(
        &self,
        conn: &Connection,
        value: &str,
        limit: Option<u32>,
        entity_name: Option<&str>,
    ) -> SearchResult<BTreeMap<String, EntitySearchResult>> {
        let mut results = BTreeMap::new();
        let needle = value.trim();
        if needle.is_empty() {
            return Ok(results);
        }
        let limit = limit.unwrap_or(self.default_limit);

        let candidates: Vec<&Arc<dyn SearchableEntity>> = match entity_name {
            Some(name) => match self
                .entities
                .iter()
                .find(|entity| entity.entity_name() == name)
            {
                Some(entity) => vec![entity],
                None => {
                    debug!(
                        "event=search_all module=search status=skipped entity={name} \
                         reason=not_configured"
                    );
                    return Ok(results);
                }
            },
            None => self.entities.iter().collect(),
        };

        let started_at = Instant::now();
        let tx = conn.unchecked_transaction()?;
        for entity in candidates {
            let spec = entity.quick_filter_spec();
            if !spec.is_searchable() {
                debug!(
                    "event=search_entity module=search status=skipped entity={} \
                     reason=no_quick_filter",
                    entity.entity_name()
                );
                continue;
            }

            let query = EntityQuery::build(entity.as_ref(), &spec)?;
            let total_count: i64 = tx.query_row(&query.count_sql, [needle], |row| row.get(0))?;
            let entries = query.fetch(&tx, needle, limit)?;
            results.insert(
                entity.entity_name().to_string(),
                EntitySearchResult {
                    entity_name: entity.entity_name().to_string(),
                    total_count: total_count.max(0) as u64,
                    entries,
                },
            );
        }
        tx.commit()?;

        info!(
            "event=search_all module=search status=ok entities={} limit={} duration_ms={}",
            results.len(),
            limit,
            started_at.elapsed().as_millis()
        );
        Ok(results)
    }
}

/// SQL for one entity, built from a validated declaration.
struct EntityQuery {
    count_sql: String,
    select_sql: String,
    contain_names: Vec<String>,
}

impl EntityQuery {
    fn build(entity: &dyn SearchableEntity, spec: &QuickFilterSpec) -> SearchResult<Self> {
        let name = entity.entity_name();
        let table = entity.table_name();
        ensure_identifier(name, table)?;

        let mut match_clauses = Vec::with_capacity(spec.fields.len());
        for field in &spec.fields {
            ensure_identifier(name, field)?;
            match_clauses.push(format!("{CONTAINS_CI_FUNCTION}(t.{field}, ?1)"));
        }
        let where_sql = format!(" WHERE ({})", match_clauses.join(" OR "));

        let mut select_columns = vec!["t.*".to_string()];
        let mut joins = String::new();
        let mut contain_names = Vec::with_capacity(spec.contain.len());
        for (index, contain) in spec.contain.iter().enumerate() {
            ensure_identifier(name, &contain.name)?;
            ensure_identifier(name, &contain.table)?;
            ensure_identifier(name, &contain.foreign_key)?;
            let alias = format!("c{index}");
            for column in &contain.columns {
                ensure_identifier(name, column)?;
                select_columns.push(format!("{alias}.{column} AS \"{}.{column}\"", contain.name));
            }
            joins.push_str(&format!(
                " LEFT JOIN {} {alias} ON {alias}.id = t.{}",
                contain.table, contain.foreign_key
            ));
            contain_names.push(contain.name.clone());
        }

        let order_column = spec.order_by.as_deref().unwrap_or("id");
        ensure_identifier(name, order_column)?;

        Ok(Self {
            count_sql: format!("SELECT COUNT(*) FROM {table} t{where_sql};"),
            select_sql: format!(
                "SELECT {} FROM {table} t{joins}{where_sql} \
                 ORDER BY t.{order_column} ASC, t.id ASC LIMIT ?2;",
                select_columns.join(", ")
            ),
            contain_names,
        })
    }

    fn fetch(
        &self,
        conn: &Connection,
        needle: &str,
        limit: u32,
    ) -> SearchResult<Vec<SearchRecord>> {
        let mut stmt = conn.prepare(&self.select_sql)?;
        let column_names = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = stmt.query(params![needle, i64::from(limit)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = SearchRecord::new();
            for (index, column) in column_names.iter().enumerate() {
                let value = value_to_json(row.get_ref(index)?);
                match column.split_once('.') {
                    Some((contain, field)) => {
                        let nested = record
                            .entry(contain.to_string())
                            .or_insert_with(|| Value::Object(Map::new()));
                        if let Value::Object(nested) = nested {
                            nested.insert(field.to_string(), value);
                        }
                    }
                    None => {
                        record.insert(column.clone(), value);
                    }
                }
            }
            for contain in &self.contain_names {
                let missing = match record.get(contain) {
                    Some(Value::Object(nested)) => nested.values().all(Value::is_null),
                    _ => true,
                };
                if missing {
                    record.insert(contain.clone(), Value::Null);
                }
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn ensure_identifier(entity: &str, identifier: &str) -> SearchResult<()> {
    if is_safe_identifier(identifier) {
        return Ok(());
    }
    Err(SearchError::InvalidEntity {
        entity: entity.to_string(),
        message: format!("`{identifier}` is not a valid table or column name"),
    })
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Value::from(number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}
