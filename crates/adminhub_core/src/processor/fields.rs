//! Payload field helpers shared by built-in processors.

use crate::processor::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._@-]{3,64}$").expect("valid username regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid url regex"));

/// Trimmed, non-empty string value of `key`, if present.
pub(crate) fn optional_str(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Like `optional_str`, but records a violation when the value is missing.
pub(crate) fn required_str(
    payload: &Value,
    key: &str,
    errors: &mut ValidationError,
) -> Option<String> {
    let value = optional_str(payload, key);
    if value.is_none() {
        errors.push(key, "is required");
    }
    value
}

/// Integer id stored either as a JSON number or a numeric string.
pub(crate) fn optional_id(payload: &Value, key: &str) -> Option<i64> {
    match payload.get(key)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn check_username(value: &str, errors: &mut ValidationError) {
    if !USERNAME_RE.is_match(value) {
        errors.push(
            "username",
            "must be 3-64 characters of letters, digits or . _ @ -",
        );
    }
}

pub(crate) fn check_email(value: &str, errors: &mut ValidationError) {
    if !EMAIL_RE.is_match(value) {
        errors.push("email", "is not a valid email address");
    }
}

pub(crate) fn check_url(value: &str, errors: &mut ValidationError) {
    if !URL_RE.is_match(value) {
        errors.push("url", "must be an http(s) URL");
    }
}
