//! Inbox entry domain model.
//!
//! # Responsibility
//! - Define pending change-requests and their lifecycle status.
//! - Validate submissions before they reach storage.
//!
//! # Invariants
//! - `scope`, `action` and `title` are non-empty after trimming.
//! - `payload` is always a JSON object.
//! - Once `status` is terminal it never changes again.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Primary key of one inbox row.
pub type InboxEntryId = i64;

/// Lifecycle state of one inbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxStatus {
    /// Awaiting review.
    Pending,
    /// The requested change was applied.
    Applied,
    /// The request was rejected without applying anything.
    Discarded,
}

impl InboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Discarded => "discarded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "applied" => Some(Self::Applied),
            "discarded" => Some(Self::Discarded),
            _ => None,
        }
    }

    /// Terminal entries accept no further mutation.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl Display for InboxStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted change-request awaiting (or past) review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: InboxEntryId,
    pub uuid: Uuid,
    /// Subsystem tag, e.g. `User`.
    pub scope: String,
    /// Operation tag within the scope, e.g. `Registration`.
    pub action: String,
    pub title: String,
    /// Requester identity or source (ip, remote instance, ...).
    pub origin: String,
    pub comment: Option<String>,
    /// Processor-specific request data. Always a JSON object.
    pub payload: Value,
    pub status: InboxStatus,
    /// Requesting user, when the request came from a known account.
    pub creator_ref: Option<i64>,
    /// Eager-loaded username of `creator_ref`.
    pub creator_username: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub modified_at: i64,
}

impl InboxEntry {
    /// Returns a copy whose payload is overlaid with reviewer-submitted data.
    ///
    /// Submitted keys win over stored ones; a non-object submission is ignored.
    pub fn with_submitted(&self, submitted: &Value) -> Self {
        let mut merged = self.clone();
        if let (Value::Object(target), Value::Object(overrides)) = (&mut merged.payload, submitted)
        {
            for (key, value) in overrides {
                target.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// Submission shape used by external request sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInboxEntry {
    pub scope: String,
    pub action: String,
    pub title: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(default)]
    pub creator_ref: Option<i64>,
}

impl NewInboxEntry {
    pub fn new(
        scope: impl Into<String>,
        action: impl Into<String>,
        title: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            scope: scope.into(),
            action: action.into(),
            title: title.into(),
            origin: String::new(),
            comment: None,
            payload,
            creator_ref: None,
        }
    }

    /// Checks submission invariants before persistence.
    pub fn validate(&self) -> Result<(), InboxValidationError> {
        for (field, value) in [
            ("scope", &self.scope),
            ("action", &self.action),
            ("title", &self.title),
        ] {
            if value.trim().is_empty() {
                return Err(InboxValidationError::EmptyField(field));
            }
        }
        if !self.payload.is_object() {
            return Err(InboxValidationError::PayloadNotObject);
        }
        Ok(())
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Submission validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxValidationError {
    EmptyField(&'static str),
    PayloadNotObject,
}

impl Display for InboxValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "inbox field `{field}` cannot be empty"),
            Self::PayloadNotObject => write!(f, "inbox payload must be a JSON object"),
        }
    }
}

impl Error for InboxValidationError {}

#[cfg(test)]
mod tests {
    use super::{InboxEntry, InboxStatus, InboxValidationError, NewInboxEntry};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn only_pending_is_not_terminal() {
        assert!(!InboxStatus::Pending.is_terminal());
        assert!(InboxStatus::Applied.is_terminal());
        assert!(InboxStatus::Discarded.is_terminal());
    }

    #[test]
    fn status_text_roundtrips() {
        for status in [
            InboxStatus::Pending,
            InboxStatus::Applied,
            InboxStatus::Discarded,
        ] {
            assert_eq!(InboxStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InboxStatus::parse("archived"), None);
    }

    #[test]
    fn validate_rejects_blank_scope_and_non_object_payload() {
        let blank = NewInboxEntry::new("  ", "edit", "title", json!({}));
        assert_eq!(
            blank.validate(),
            Err(InboxValidationError::EmptyField("scope"))
        );

        let scalar = NewInboxEntry::new("users", "edit", "title", json!("x"));
        assert_eq!(
            scalar.validate(),
            Err(InboxValidationError::PayloadNotObject)
        );
    }

    #[test]
    fn submitted_object_overrides_stored_payload_keys() {
        let entry = InboxEntry {
            id: 1,
            uuid: Uuid::new_v4(),
            scope: "users".to_string(),
            action: "edit".to_string(),
            title: "rename".to_string(),
            origin: String::new(),
            comment: None,
            payload: json!({"username": "alice2", "email": "a@example.org"}),
            status: InboxStatus::Pending,
            creator_ref: None,
            creator_username: None,
            created_at: 0,
            modified_at: 0,
        };

        let merged = entry.with_submitted(&json!({"username": "alice3"}));
        assert_eq!(merged.payload["username"], "alice3");
        assert_eq!(merged.payload["email"], "a@example.org");
        assert_eq!(entry.with_submitted(&json!("ignored")).payload, entry.payload);
    }
}
