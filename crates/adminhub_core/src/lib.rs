//! Core domain logic for the admin backend.
//! Owns the inbox review workflow and the cross-entity quick search.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod processor;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::inbox::{InboxEntry, InboxEntryId, InboxStatus, NewInboxEntry};
pub use processor::{
    register_builtin_processors, ProcessingContext, ProcessorError, ProcessorRegistry,
    ProcessorResult, RequestProcessor, ResponseDescriptor, TransportRequest,
};
pub use repo::inbox_repo::{InboxListQuery, InboxStore, SqliteInboxStore};
pub use repo::{RepoError, RepoResult};
pub use search::aggregator::{EntitySearchResult, SearchAggregator};
pub use search::{SearchError, SearchResult};
pub use service::inbox_service::{IndexParams, InboxPage, InboxService, ProcessResponse};

/// Registry holding every processor shipped with the core.
pub fn builtin_registry() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    register_builtin_processors(&mut registry);
    registry
}

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
