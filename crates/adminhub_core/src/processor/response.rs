//! Transport-neutral request and response descriptions.
//!
//! The boundary (HTTP server, CLI, tests) turns a `TransportRequest` into a
//! core call and renders the returned `ResponseDescriptor` as JSON or HTML.

use crate::model::inbox::InboxEntryId;
use crate::processor::{ProcessingOutcome, ProcessorError, RegistryError};
use serde::Serialize;
use serde_json::{json, Value};

/// Index page the HTML boundary returns to after a processing action.
pub const INBOX_INDEX_PATH: &str = "/inbox/index";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Json,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Success,
    ClientError,
    ServerError,
}

/// The fields of an incoming request the core needs, and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub entry_id: Option<InboxEntryId>,
    pub body: Value,
    /// Content negotiation: REST callers get JSON, others an HTML view.
    pub is_rest: bool,
}

impl TransportRequest {
    pub fn get(entry_id: Option<InboxEntryId>) -> Self {
        Self {
            method: HttpMethod::Get,
            entry_id,
            body: Value::Null,
            is_rest: false,
        }
    }

    pub fn post(entry_id: Option<InboxEntryId>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            entry_id,
            body,
            is_rest: false,
        }
    }

    pub fn rest(mut self) -> Self {
        self.is_rest = true;
        self
    }

    pub fn is_post(&self) -> bool {
        self.method == HttpMethod::Post
    }

    pub fn format(&self) -> ResponseFormat {
        if self.is_rest {
            ResponseFormat::Json
        } else {
            ResponseFormat::Html
        }
    }
}

/// What the boundary should send back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseDescriptor {
    pub status_class: StatusClass,
    pub status_code: u16,
    pub message: String,
    pub body: Option<Value>,
    pub format: ResponseFormat,
    /// HTML callers are sent back to this path after the action.
    pub redirect: Option<String>,
}

impl ResponseDescriptor {
    pub fn success(
        message: impl Into<String>,
        body: Option<Value>,
        format: ResponseFormat,
    ) -> Self {
        Self {
            status_class: StatusClass::Success,
            status_code: 200,
            message: message.into(),
            body,
            format,
            redirect: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_class == StatusClass::Success
    }

    fn with_redirect_for_html(mut self) -> Self {
        if self.format == ResponseFormat::Html {
            self.redirect = Some(INBOX_INDEX_PATH.to_string());
        }
        self
    }
}

/// Default outcome mapping used by every processor.
pub fn describe_outcome(outcome: &ProcessingOutcome, format: ResponseFormat) -> ResponseDescriptor {
    match outcome {
        ProcessingOutcome::Applied(applied) => ResponseDescriptor::success(
            applied.message.clone(),
            Some(json!({
                "success": true,
                "message": applied.message,
                "data": applied.data,
            })),
            format,
        )
        .with_redirect_for_html(),
        ProcessingOutcome::Discarded(discarded) => ResponseDescriptor::success(
            discarded.message.clone(),
            Some(json!({
                "success": true,
                "message": discarded.message,
                "data": {"id": discarded.entry_id},
            })),
            format,
        )
        .with_redirect_for_html(),
        ProcessingOutcome::Rejected(err) => describe_error(err, format),
    }
}

/// Maps any processing error to a response.
pub fn describe_error(err: &ProcessorError, format: ResponseFormat) -> ResponseDescriptor {
    let (status_class, status_code) = status_for(err);
    let errors = match err {
        ProcessorError::Validation(validation) => {
            serde_json::to_value(&validation.violations).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    };
    let message = err.to_string();
    ResponseDescriptor {
        status_class,
        status_code,
        body: Some(json!({
            "success": false,
            "message": message,
            "errors": errors,
        })),
        message,
        format,
        redirect: None,
    }
}

fn status_for(err: &ProcessorError) -> (StatusClass, u16) {
    match err {
        ProcessorError::Registry(RegistryError::NotFound { .. }) => (StatusClass::ClientError, 404),
        ProcessorError::Registry(RegistryError::Disabled { .. }) => (StatusClass::ClientError, 403),
        ProcessorError::NotFound { .. } => (StatusClass::ClientError, 404),
        ProcessorError::InvalidFilter(_) => (StatusClass::ClientError, 400),
        ProcessorError::Validation(_) => (StatusClass::ClientError, 422),
        ProcessorError::AlreadyTerminal { .. } => (StatusClass::ClientError, 409),
        ProcessorError::Apply { .. }
        | ProcessorError::Discard { .. }
        | ProcessorError::Storage(_) => {
            (StatusClass::ServerError, 500)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{describe_error, describe_outcome, ResponseFormat, StatusClass, INBOX_INDEX_PATH};
    use crate::model::inbox::InboxStatus;
    use crate::processor::{
        ApplyOutcome, ProcessingOutcome, ProcessorError, RegistryError, ValidationError,
    };
    use serde_json::json;

    #[test]
    fn applied_outcome_is_success_with_redirect_for_html() {
        let outcome = ProcessingOutcome::Applied(ApplyOutcome {
            entry_id: 3,
            message: "done".to_string(),
            data: json!({"id": 9}),
        });
        let html = describe_outcome(&outcome, ResponseFormat::Html);
        assert!(html.is_success());
        assert_eq!(html.redirect.as_deref(), Some(INBOX_INDEX_PATH));

        let rest = describe_outcome(&outcome, ResponseFormat::Json);
        assert_eq!(rest.redirect, None);
        assert_eq!(rest.body.unwrap()["data"]["id"], 9);
    }

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (
                ProcessorError::AlreadyTerminal {
                    id: 1,
                    status: InboxStatus::Applied,
                },
                409,
            ),
            (
                ProcessorError::Validation(ValidationError::single("name", "is required")),
                422,
            ),
            (
                ProcessorError::Registry(RegistryError::Disabled {
                    scope: "a".to_string(),
                    action: "b".to_string(),
                }),
                403,
            ),
            (
                ProcessorError::NotFound {
                    entity: "inbox entry",
                    id: 4,
                },
                404,
            ),
        ];
        for (err, code) in cases {
            let response = describe_error(&err, ResponseFormat::Json);
            assert_eq!(response.status_code, code);
            assert_eq!(response.status_class, StatusClass::ClientError);
        }
    }

    #[test]
    fn validation_errors_are_exposed_verbatim() {
        let err = ProcessorError::Validation(ValidationError::single("email", "is required"));
        let response = describe_error(&err, ResponseFormat::Json);
        let body = response.body.unwrap();
        assert_eq!(body["errors"][0]["field"], "email");
        assert_eq!(body["errors"][0]["message"], "is required");
    }
}
