//! Inbox use-case service.
//!
//! # Responsibility
//! - Expose the review workflow (index, view, process, delete) as
//!   transport-neutral calls.
//! - Dispatch every entry to its processor through the injected registry.
//!
//! # Invariants
//! - Listing filters outside the allow-lists fail with `InvalidFilter`.
//! - Page sizes are clamped to `[1, max_page_size]`.
//! - GET requests never mutate; POST requests apply or discard exactly once.

use crate::config::InboxConfig;
use crate::model::inbox::{InboxEntry, InboxEntryId, InboxStatus, NewInboxEntry};
use crate::processor::{
    response, ProcessingContext, ProcessingOutcome, ProcessorError, ProcessorRegistry,
    ProcessorResult, RenderedView, ResponseDescriptor, TransportRequest, ValidationError,
};
use crate::processor::{ApplyOutcome, DiscardOutcome};
use crate::repo::inbox_repo::{
    InboxListQuery, InboxStore, SqliteInboxStore, INBOX_CONTEXT_FILTER_FIELDS,
};
use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Listing parameters for the inbox index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexParams {
    pub filters: BTreeMap<String, String>,
    pub quick_filter: Option<String>,
    /// One-click filters restricted to `INBOX_CONTEXT_FILTER_FIELDS`.
    pub context_filters: BTreeMap<String, String>,
    pub status: Option<InboxStatus>,
    /// 1-based; `0` is treated as the first page.
    pub page: u32,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboxPage {
    pub items: Vec<InboxEntry>,
    /// Matches across all pages.
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// What `process` hands back to the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResponse {
    /// GET: the confirmation view for the reviewer.
    Review(RenderedView),
    Response(ResponseDescriptor),
}

/// Use-case service over the inbox store and processor registry.
pub struct InboxService {
    registry: Arc<ProcessorRegistry>,
    settings: InboxConfig,
}

impl InboxService {
    pub fn new(registry: Arc<ProcessorRegistry>, settings: InboxConfig) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Stores a new pending request on behalf of an external submitter.
    pub fn submit(&self, conn: &Connection, entry: &NewInboxEntry) -> ProcessorResult<InboxEntry> {
        let created = SqliteInboxStore::new(conn).create(entry)?;
        if let Err(err) = self.registry.resolve(&created.scope, &created.action) {
            warn!(
                "event=inbox_submit module=service status=unprocessable id={} error={}",
                created.id, err
            );
        } else {
            info!(
                "event=inbox_submit module=service status=ok id={} scope={} action={}",
                created.id, created.scope, created.action
            );
        }
        Ok(created)
    }

    /// Lists entries newest first, with the requester eager-loaded.
    pub fn index(&self, conn: &Connection, params: &IndexParams) -> ProcessorResult<InboxPage> {
        let mut filters = params.filters.clone();
        for (field, value) in &params.context_filters {
            if !INBOX_CONTEXT_FILTER_FIELDS.contains(&field.as_str()) {
                return Err(ProcessorError::InvalidFilter(field.clone()));
            }
            filters.insert(field.clone(), value.clone());
        }

        let limit = params
            .limit
            .unwrap_or(self.settings.default_page_size)
            .clamp(1, self.settings.max_page_size.max(1));
        let page = params.page.max(1);
        let query = InboxListQuery {
            filters,
            quick_filter: params.quick_filter.clone(),
            status: params.status,
            limit: Some(limit),
            offset: (page - 1).saturating_mul(limit),
        };

        let store = SqliteInboxStore::new(conn);
        let total = store.count(&query)?;
        let items = store.list(&query)?;
        Ok(InboxPage {
            items,
            total,
            page,
            limit,
        })
    }

    /// Distinct values offered for each context filter field.
    pub fn context_filter_values(
        &self,
        conn: &Connection,
    ) -> ProcessorResult<BTreeMap<String, Vec<String>>> {
        let store = SqliteInboxStore::new(conn);
        let mut values = BTreeMap::new();
        for field in INBOX_CONTEXT_FILTER_FIELDS {
            values.insert(field.to_string(), store.context_values(field)?);
        }
        Ok(values)
    }

    pub fn view(&self, conn: &Connection, id: InboxEntryId) -> ProcessorResult<InboxEntry> {
        Ok(SqliteInboxStore::new(conn).get(id)?)
    }

    /// Renders the entry through its processor.
    pub fn render(&self, conn: &Connection, id: InboxEntryId) -> ProcessorResult<RenderedView> {
        let entry = SqliteInboxStore::new(conn).get(id)?;
        let processor = self.registry.resolve(&entry.scope, &entry.action)?;
        processor.render(conn, &entry)
    }

    /// Applies the entry with reviewer-submitted data overlaid on its payload.
    pub fn apply(
        &self,
        conn: &mut Connection,
        id: InboxEntryId,
        submitted: Value,
    ) -> ProcessorResult<ApplyOutcome> {
        let entry = SqliteInboxStore::new(conn).get(id)?;
        let processor = self.registry.resolve(&entry.scope, &entry.action)?;
        processor.apply(conn, &self.context(id, submitted))
    }

    pub fn discard(
        &self,
        conn: &mut Connection,
        id: InboxEntryId,
    ) -> ProcessorResult<DiscardOutcome> {
        let entry = SqliteInboxStore::new(conn).get(id)?;
        let processor = self.registry.resolve(&entry.scope, &entry.action)?;
        processor.discard(conn, &self.context(id, Value::Null), &entry)
    }

    fn context(&self, id: InboxEntryId, submitted: Value) -> ProcessingContext {
        ProcessingContext {
            max_conflict_retries: self.settings.apply_max_retries,
            ..ProcessingContext::new(id, submitted)
        }
    }

    /// GET renders the confirmation view; POST applies and describes the outcome.
    pub fn process(&self, conn: &mut Connection, request: &TransportRequest) -> ProcessResponse {
        let id = match required_entry_id(request) {
            Ok(id) => id,
            Err(err) => {
                return ProcessResponse::Response(response::describe_error(&err, request.format()))
            }
        };

        if !request.is_post() {
            return match self.render(conn, id) {
                Ok(view) => ProcessResponse::Review(view),
                Err(err) => {
                    ProcessResponse::Response(response::describe_error(&err, request.format()))
                }
            };
        }

        let entry = SqliteInboxStore::new(conn).get(id).map_err(ProcessorError::from);
        let processor = entry.and_then(|entry| {
            self.registry
                .resolve(&entry.scope, &entry.action)
                .map_err(ProcessorError::from)
        });
        match processor {
            Ok(processor) => {
                let ctx = self.context(id, request.body.clone());
                let outcome = ProcessingOutcome::from(processor.apply(conn, &ctx));
                ProcessResponse::Response(processor.describe_http_outcome(&outcome, request))
            }
            Err(err) => ProcessResponse::Response(response::describe_error(&err, request.format())),
        }
    }

    /// GET asks for confirmation; POST discards and describes the outcome.
    pub fn delete(&self, conn: &mut Connection, request: &TransportRequest) -> ResponseDescriptor {
        let id = match required_entry_id(request) {
            Ok(id) => id,
            Err(err) => return response::describe_error(&err, request.format()),
        };

        if !request.is_post() {
            return match self.view(conn, id) {
                Ok(entry) => ResponseDescriptor::success(
                    format!("Discard request #{id}?"),
                    Some(json!({
                        "id": entry.id,
                        "scope": entry.scope,
                        "action": entry.action,
                        "title": entry.title,
                        "status": entry.status,
                    })),
                    request.format(),
                ),
                Err(err) => response::describe_error(&err, request.format()),
            };
        }

        let entry = SqliteInboxStore::new(conn).get(id).map_err(ProcessorError::from);
        let resolved = entry.and_then(|entry| {
            self.registry
                .resolve(&entry.scope, &entry.action)
                .map(|processor| (processor, entry))
                .map_err(ProcessorError::from)
        });
        match resolved {
            Ok((processor, entry)) => {
                let ctx = self.context(id, Value::Null);
                let outcome = ProcessingOutcome::from(processor.discard(conn, &ctx, &entry));
                processor.describe_http_outcome(&outcome, request)
            }
            Err(err) => response::describe_error(&err, request.format()),
        }
    }

    /// REST callers get descriptors grouped by scope; others get flat rows.
    pub fn list_processors(&self, request: &TransportRequest) -> ResponseDescriptor {
        let body = if request.is_rest {
            serde_json::to_value(self.registry.list())
        } else {
            serde_json::to_value(self.registry.descriptors())
        };
        ResponseDescriptor::success(
            format!("{} processor(s) registered", self.registry.len()),
            Some(body.unwrap_or(Value::Null)),
            request.format(),
        )
    }
}

fn required_entry_id(request: &TransportRequest) -> ProcessorResult<InboxEntryId> {
    request
        .entry_id
        .ok_or_else(|| ProcessorError::Validation(ValidationError::single("id", "is required")))
}

#[cfg(test)]
mod tests {
    use super::{IndexParams, InboxService};
    use crate::config::InboxConfig;
    use crate::db::open_db_in_memory;
    use crate::processor::{
        register_builtin_processors, ProcessorError, ProcessorRegistry, TransportRequest,
    };
    use std::sync::Arc;

    fn service() -> InboxService {
        let mut registry = ProcessorRegistry::new();
        register_builtin_processors(&mut registry);
        InboxService::new(Arc::new(registry), InboxConfig::default())
    }

    #[test]
    fn unknown_context_filter_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        let mut params = IndexParams::default();
        params
            .context_filters
            .insert("title".to_string(), "x".to_string());
        let err = service().index(&conn, &params).unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidFilter(ref key) if key == "title"));
    }

    #[test]
    fn page_size_is_clamped() {
        let conn = open_db_in_memory().unwrap();
        let params = IndexParams {
            limit: Some(10_000),
            ..IndexParams::default()
        };
        let page = service().index(&conn, &params).unwrap();
        assert_eq!(page.limit, 100);
        assert_eq!(page.page, 1);
        assert_eq!(page.total, 0);
    }

    #[test]
    fn missing_entry_id_is_a_client_error() {
        let mut conn = open_db_in_memory().unwrap();
        let request = TransportRequest::post(None, serde_json::json!({}));
        let response = service().delete(&mut conn, &request);
        assert_eq!(response.status_code, 422);
    }

    #[test]
    fn processor_listing_shape_follows_content_negotiation() {
        let service = service();
        let rest = service.list_processors(&TransportRequest::get(None).rest());
        let grouped = rest.body.unwrap();
        assert_eq!(grouped["users"][0]["action"], "edit");

        let html = service.list_processors(&TransportRequest::get(None));
        let rows = html.body.unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 3);
        assert_eq!(rows[0]["scope"], "Organisation");
    }
}
