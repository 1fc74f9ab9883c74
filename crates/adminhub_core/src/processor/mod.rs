//! Inbox request processors.
//!
//! # Responsibility
//! - Define the capability contract every (scope, action) handler implements.
//! - Run `apply`/`discard` inside one immediate transaction so the domain
//!   mutation and the inbox status flip commit or roll back together.
//! - Retry a transaction at most `max_conflict_retries` times, and only for
//!   busy/locked conflicts.
//!
//! # Invariants
//! - A terminal entry is never re-applied; callers observe `AlreadyTerminal`.
//! - Validation failures are returned verbatim and never retried.
//! - Storage failures during apply surface as `ProcessorError::Apply`, and
//!   during discard as `ProcessorError::Discard`, with no partial state left
//!   behind.

use crate::model::inbox::{InboxEntry, InboxEntryId, InboxStatus, InboxValidationError};
use crate::repo::inbox_repo::{InboxStore, SqliteInboxStore};
use crate::repo::RepoError;
use log::{info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod fields;
pub mod organisation;
pub mod registry;
pub mod response;
pub mod user;

pub use registry::{ProcessorDescriptor, ProcessorRegistry, RegistryError};
pub use response::{
    HttpMethod, ResponseDescriptor, ResponseFormat, StatusClass, TransportRequest,
};

/// Conflict retries granted to one apply/discard call unless configured.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 1;

pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// One rejected payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// User-correctable payload problems reported by `validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns `Ok(value)` when nothing was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts = self
            .violations
            .iter()
            .map(|violation| format!("{}: {}", violation.field, violation.message))
            .collect::<Vec<_>>();
        write!(f, "validation failed: {}", parts.join("; "))
    }
}

impl Error for ValidationError {}

/// Error taxonomy for inbox processing.
#[derive(Debug)]
pub enum ProcessorError {
    /// No processor, or a disabled one, for the entry's (scope, action).
    Registry(RegistryError),
    NotFound {
        entity: &'static str,
        id: i64,
    },
    InvalidFilter(String),
    Validation(ValidationError),
    AlreadyTerminal {
        id: InboxEntryId,
        status: InboxStatus,
    },
    /// Domain mutation failed; retries for transient conflicts are exhausted.
    Apply {
        entry_id: InboxEntryId,
        attempts: u32,
        source: RepoError,
    },
    /// Status flip to `discarded` failed after the same retry budget.
    Discard {
        entry_id: InboxEntryId,
        attempts: u32,
        source: RepoError,
    },
    /// Storage failure outside of an apply or discard transaction.
    Storage(RepoError),
}

impl ProcessorError {
    fn is_transient_conflict(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_transient_conflict())
    }
}

impl Display for ProcessorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidFilter(key) => write!(f, "unsupported filter `{key}`"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::AlreadyTerminal { id, status } => {
                write!(f, "inbox entry {id} is already {status}")
            }
            Self::Apply {
                entry_id,
                attempts,
                source,
            } => write!(
                f,
                "failed to apply inbox entry {entry_id} after {attempts} attempt(s): {source}"
            ),
            Self::Discard {
                entry_id,
                attempts,
                source,
            } => write!(
                f,
                "failed to discard inbox entry {entry_id} after {attempts} attempt(s): {source}"
            ),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProcessorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Apply { source, .. } | Self::Discard { source, .. } => Some(source),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ProcessorError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::AlreadyTerminal { id, status } => Self::AlreadyTerminal { id, status },
            RepoError::InvalidFilter(key) => Self::InvalidFilter(key),
            RepoError::Validation(err) => Self::Validation(inbox_violation(err)),
            other => Self::Storage(other),
        }
    }
}

impl From<rusqlite::Error> for ProcessorError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(RepoError::from(value))
    }
}

impl From<RegistryError> for ProcessorError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<ValidationError> for ProcessorError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

fn inbox_violation(err: InboxValidationError) -> ValidationError {
    let field = match &err {
        InboxValidationError::EmptyField(field) => *field,
        InboxValidationError::PayloadNotObject => "payload",
    };
    ValidationError::single(field, err.to_string())
}

/// Normalized data a processor will write, produced by `validate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatedChange {
    pub fields: Map<String, Value>,
}

impl ValidatedChange {
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn i64_field(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }
}

/// Proposed-versus-current value of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub current: Option<Value>,
    pub proposed: Value,
}

/// Review representation of a pending change for confirmation screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedView {
    pub entry_id: InboxEntryId,
    pub scope: String,
    pub action: String,
    pub title: String,
    pub summary: String,
    pub changes: Vec<FieldChange>,
    /// Problems that would block `apply` as the payload stands.
    pub violations: Vec<FieldViolation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyOutcome {
    pub entry_id: InboxEntryId,
    pub message: String,
    /// The created or updated record.
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscardOutcome {
    pub entry_id: InboxEntryId,
    pub message: String,
}

/// Result of one processing call as seen by the transport boundary.
#[derive(Debug)]
pub enum ProcessingOutcome {
    Applied(ApplyOutcome),
    Discarded(DiscardOutcome),
    Rejected(ProcessorError),
}

impl From<ProcessorResult<ApplyOutcome>> for ProcessingOutcome {
    fn from(value: ProcessorResult<ApplyOutcome>) -> Self {
        match value {
            Ok(outcome) => Self::Applied(outcome),
            Err(err) => Self::Rejected(err),
        }
    }
}

impl From<ProcessorResult<DiscardOutcome>> for ProcessingOutcome {
    fn from(value: ProcessorResult<DiscardOutcome>) -> Self {
        match value {
            Ok(outcome) => Self::Discarded(outcome),
            Err(err) => Self::Rejected(err),
        }
    }
}

/// Explicit per-call input replacing any framework request object.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingContext {
    pub entry_id: InboxEntryId,
    /// Reviewer-submitted data overlaid on the stored payload.
    pub submitted: Value,
    pub max_conflict_retries: u32,
}

impl ProcessingContext {
    pub fn new(entry_id: InboxEntryId, submitted: Value) -> Self {
        Self {
            entry_id,
            submitted,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

/// Handler for one (scope, action) kind of pending change.
///
/// Implementors provide `validate`, `render` and `apply_change`; the
/// transactional `apply`/`discard` flow and response mapping come for free.
pub trait RequestProcessor: Send + Sync {
    /// Checks the payload against processor rules. Read-only.
    fn validate(&self, conn: &Connection, entry: &InboxEntry) -> ProcessorResult<ValidatedChange>;

    /// Builds the review view without mutating anything.
    fn render(&self, conn: &Connection, entry: &InboxEntry) -> ProcessorResult<RenderedView>;

    /// Performs the domain mutation inside the caller's transaction.
    fn apply_change(
        &self,
        tx: &Transaction<'_>,
        entry: &InboxEntry,
        change: &ValidatedChange,
    ) -> ProcessorResult<ApplyOutcome>;

    /// Validates and applies the entry, then marks it `applied`, atomically.
    fn apply(
        &self,
        conn: &mut Connection,
        ctx: &ProcessingContext,
    ) -> ProcessorResult<ApplyOutcome> {
        let result = with_conflict_retry(
            "inbox_apply",
            ctx.entry_id,
            ctx.max_conflict_retries,
            || apply_once(self, &mut *conn, ctx),
        );
        match result {
            Ok((outcome, attempts)) => {
                info!(
                    "event=inbox_apply module=processor status=ok id={} attempts={}",
                    ctx.entry_id, attempts
                );
                Ok(outcome)
            }
            Err((ProcessorError::Storage(source), attempts)) => {
                warn!(
                    "event=inbox_apply module=processor status=error id={} attempts={} error={}",
                    ctx.entry_id, attempts, source
                );
                Err(ProcessorError::Apply {
                    entry_id: ctx.entry_id,
                    attempts,
                    source,
                })
            }
            Err((err, _)) => Err(err),
        }
    }

    /// Marks the entry `discarded` without applying anything.
    ///
    /// Honours `ctx.max_conflict_retries` like `apply`; `ctx.submitted` is
    /// ignored.
    fn discard(
        &self,
        conn: &mut Connection,
        ctx: &ProcessingContext,
        entry: &InboxEntry,
    ) -> ProcessorResult<DiscardOutcome> {
        let entry_id = ctx.entry_id;
        if entry.id != entry_id {
            return Err(ProcessorError::NotFound {
                entity: "inbox entry",
                id: entry_id,
            });
        }
        let result = with_conflict_retry(
            "inbox_discard",
            entry_id,
            ctx.max_conflict_retries,
            || {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                SqliteInboxStore::new(&tx).mark_discarded(entry_id)?;
                tx.commit()?;
                Ok(())
            },
        );
        match result {
            Ok(((), _)) => {
                info!(
                    "event=inbox_discard module=processor status=ok id={} scope={} action={}",
                    entry_id, entry.scope, entry.action
                );
                Ok(DiscardOutcome {
                    entry_id,
                    message: format!("Request #{entry_id} discarded."),
                })
            }
            Err((ProcessorError::Storage(source), attempts)) => {
                warn!(
                    "event=inbox_discard module=processor status=error id={} attempts={} error={}",
                    entry_id, attempts, source
                );
                Err(ProcessorError::Discard {
                    entry_id,
                    attempts,
                    source,
                })
            }
            Err((err, _)) => Err(err),
        }
    }

    /// Maps an outcome to a transport-neutral response.
    fn describe_http_outcome(
        &self,
        outcome: &ProcessingOutcome,
        request: &TransportRequest,
    ) -> ResponseDescriptor {
        response::describe_outcome(outcome, request.format())
    }
}

fn apply_once<P: RequestProcessor + ?Sized>(
    processor: &P,
    conn: &mut Connection,
    ctx: &ProcessingContext,
) -> ProcessorResult<ApplyOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let store = SqliteInboxStore::new(&tx);
    let stored = store.get(ctx.entry_id)?;
    if stored.status.is_terminal() {
        return Err(ProcessorError::AlreadyTerminal {
            id: stored.id,
            status: stored.status,
        });
    }

    let effective = stored.with_submitted(&ctx.submitted);
    let change = processor.validate(&tx, &effective)?;
    let outcome = processor.apply_change(&tx, &effective, &change)?;
    store.mark_applied(stored.id)?;
    tx.commit()?;
    Ok(outcome)
}

/// Runs `op` again while it fails with a transient conflict and retries remain.
///
/// Returns the value or error together with the number of attempts made.
fn with_conflict_retry<T>(
    event: &str,
    entry_id: InboxEntryId,
    max_retries: u32,
    mut op: impl FnMut() -> ProcessorResult<T>,
) -> Result<(T, u32), (ProcessorError, u32)> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match op() {
            Ok(value) => return Ok((value, attempts)),
            Err(err) if err.is_transient_conflict() && attempts <= max_retries => {
                warn!(
                    "event={} module=processor status=retry id={} attempt={} error={}",
                    event, entry_id, attempts, err
                );
            }
            Err(err) => return Err((err, attempts)),
        }
    }
}

/// Registers the processors shipped with the core.
pub fn register_builtin_processors(registry: &mut ProcessorRegistry) {
    use std::sync::Arc;

    registry.register(
        user::USER_REGISTRATION_SCOPE,
        user::USER_REGISTRATION_ACTION,
        Arc::new(user::UserRegistrationProcessor),
    );
    registry.register(
        user::USER_EDIT_SCOPE,
        user::USER_EDIT_ACTION,
        Arc::new(user::UserEditProcessor),
    );
    registry.register(
        organisation::ORGANISATION_CREATE_SCOPE,
        organisation::ORGANISATION_CREATE_ACTION,
        Arc::new(organisation::OrganisationCreateProcessor),
    );
}
