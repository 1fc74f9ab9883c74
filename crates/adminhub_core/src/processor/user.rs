//! User account processors: self-registration and account edits.

use crate::model::directory::{IndividualRecord, NewIndividual, UserRecord};
use crate::model::inbox::InboxEntry;
use crate::processor::fields::{
    check_email, check_username, optional_id, optional_str, required_str,
};
use crate::processor::{
    ApplyOutcome, FieldChange, ProcessorError, ProcessorResult, RenderedView, RequestProcessor,
    ValidatedChange, ValidationError,
};
use crate::repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
use crate::repo::RepoError;
use rusqlite::{Connection, Transaction};
use serde_json::{json, Value};

pub const USER_REGISTRATION_SCOPE: &str = "User";
pub const USER_REGISTRATION_ACTION: &str = "Registration";
pub const USER_EDIT_SCOPE: &str = "users";
pub const USER_EDIT_ACTION: &str = "edit";

const REGISTRATION_FIELDS: &[&str] = &[
    "username",
    "email",
    "first_name",
    "last_name",
    "position",
    "organisation_id",
];
const INDIVIDUAL_EDIT_FIELDS: &[&str] = &["email", "first_name", "last_name", "position"];

/// Creates an individual and a user account from a registration request.
pub struct UserRegistrationProcessor;

impl UserRegistrationProcessor {
    fn collect(
        &self,
        conn: &Connection,
        entry: &InboxEntry,
    ) -> ProcessorResult<(ValidatedChange, ValidationError)> {
        let repo = SqliteDirectoryRepository::new(conn);
        let payload = &entry.payload;
        let mut errors = ValidationError::new();
        let mut change = ValidatedChange::default();

        if let Some(username) = required_str(payload, "username", &mut errors) {
            check_username(&username, &mut errors);
            if repo.find_user_by_username(&username)?.is_some() {
                errors.push("username", "is already taken");
            }
            change.set("username", username);
        }
        if let Some(email) = required_str(payload, "email", &mut errors) {
            check_email(&email, &mut errors);
            change.set("email", email);
        }
        for key in ["first_name", "last_name", "position"] {
            if let Some(value) = optional_str(payload, key) {
                change.set(key, value);
            }
        }
        if let Some(organisation_id) = optional_id(payload, "organisation_id") {
            if repo.get_organisation(organisation_id)?.is_none() {
                errors.push("organisation_id", "does not exist");
            }
            change.set("organisation_id", organisation_id);
        }

        Ok((change, errors))
    }
}

impl RequestProcessor for UserRegistrationProcessor {
    fn validate(&self, conn: &Connection, entry: &InboxEntry) -> ProcessorResult<ValidatedChange> {
        let (change, errors) = self.collect(conn, entry)?;
        errors.into_result(change).map_err(ProcessorError::from)
    }

    fn render(&self, conn: &Connection, entry: &InboxEntry) -> ProcessorResult<RenderedView> {
        let (change, errors) = self.collect(conn, entry)?;
        let changes = REGISTRATION_FIELDS
            .iter()
            .filter_map(|field| {
                change.fields.get(*field).map(|proposed| FieldChange {
                    field: (*field).to_string(),
                    current: None,
                    proposed: proposed.clone(),
                })
            })
            .collect();
        Ok(RenderedView {
            entry_id: entry.id,
            scope: entry.scope.clone(),
            action: entry.action.clone(),
            title: entry.title.clone(),
            summary: format!(
                "Create user `{}` requested from {}",
                change.str_field("username").unwrap_or("?"),
                display_origin(entry)
            ),
            changes,
            violations: errors.violations,
        })
    }

    fn apply_change(
        &self,
        tx: &Transaction<'_>,
        entry: &InboxEntry,
        change: &ValidatedChange,
    ) -> ProcessorResult<ApplyOutcome> {
        let repo = SqliteDirectoryRepository::new(tx);
        let individual = repo.create_individual(&NewIndividual {
            email: change.str_field("email").unwrap_or_default().to_string(),
            first_name: change.str_field("first_name").unwrap_or_default().to_string(),
            last_name: change.str_field("last_name").unwrap_or_default().to_string(),
            position: change.str_field("position").map(str::to_string),
        })?;
        let user = repo.create_user(
            change.str_field("username").unwrap_or_default(),
            individual.id,
            change.i64_field("organisation_id"),
        )?;

        Ok(ApplyOutcome {
            entry_id: entry.id,
            message: format!("User `{}` created.", user.username),
            data: json!({ "user": user, "individual": individual }),
        })
    }
}

/// Updates an existing account and its individual.
///
/// The target is `payload.user_id`, falling back to the requesting user.
pub struct UserEditProcessor;

struct EditTarget {
    user: UserRecord,
    individual: IndividualRecord,
}

impl UserEditProcessor {
    fn collect(
        &self,
        conn: &Connection,
        entry: &InboxEntry,
    ) -> ProcessorResult<(ValidatedChange, ValidationError, Option<EditTarget>)> {
        let repo = SqliteDirectoryRepository::new(conn);
        let payload = &entry.payload;
        let mut errors = ValidationError::new();
        let mut change = ValidatedChange::default();

        let Some(user_id) = optional_id(payload, "user_id").or(entry.creator_ref) else {
            errors.push("user_id", "target user is required");
            return Ok((change, errors, None));
        };
        change.set("user_id", user_id);
        let Some(user) = repo.get_user(user_id)? else {
            errors.push("user_id", "does not exist");
            return Ok((change, errors, None));
        };
        let individual = repo
            .get_individual(user.individual_id)?
            .ok_or(RepoError::NotFound {
                entity: "individual",
                id: user.individual_id,
            })?;

        if let Some(username) = optional_str(payload, "username") {
            check_username(&username, &mut errors);
            let clash = repo
                .find_user_by_username(&username)?
                .filter(|other| other.id != user.id);
            if clash.is_some() {
                errors.push("username", "is already taken");
            }
            change.set("username", username);
        }
        for key in INDIVIDUAL_EDIT_FIELDS {
            if let Some(value) = optional_str(payload, key) {
                if *key == "email" {
                    check_email(&value, &mut errors);
                }
                change.set(key, value);
            }
        }
        if change.fields.len() == 1 {
            errors.push("payload", "contains no editable field");
        }

        Ok((change, errors, Some(EditTarget { user, individual })))
    }
}

impl RequestProcessor for UserEditProcessor {
    fn validate(&self, conn: &Connection, entry: &InboxEntry) -> ProcessorResult<ValidatedChange> {
        let (change, errors, _) = self.collect(conn, entry)?;
        errors.into_result(change).map_err(ProcessorError::from)
    }

    fn render(&self, conn: &Connection, entry: &InboxEntry) -> ProcessorResult<RenderedView> {
        let (change, errors, target) = self.collect(conn, entry)?;
        let mut changes = Vec::new();
        for (field, proposed) in &change.fields {
            if field == "user_id" {
                continue;
            }
            let current = target.as_ref().and_then(|target| current_value(target, field));
            changes.push(FieldChange {
                field: field.clone(),
                current,
                proposed: proposed.clone(),
            });
        }
        let summary = match &target {
            Some(target) => format!("Edit user `{}`", target.user.username),
            None => "Edit unknown user".to_string(),
        };
        Ok(RenderedView {
            entry_id: entry.id,
            scope: entry.scope.clone(),
            action: entry.action.clone(),
            title: entry.title.clone(),
            summary,
            changes,
            violations: errors.violations,
        })
    }

    fn apply_change(
        &self,
        tx: &Transaction<'_>,
        entry: &InboxEntry,
        change: &ValidatedChange,
    ) -> ProcessorResult<ApplyOutcome> {
        let repo = SqliteDirectoryRepository::new(tx);
        let user_id = change.i64_field("user_id").ok_or_else(|| {
            ProcessorError::Validation(ValidationError::single(
                "user_id",
                "target user is required",
            ))
        })?;
        let mut user = repo.get_user(user_id)?.ok_or(RepoError::NotFound {
            entity: "user",
            id: user_id,
        })?;
        let mut individual = repo
            .get_individual(user.individual_id)?
            .ok_or(RepoError::NotFound {
                entity: "individual",
                id: user.individual_id,
            })?;

        if let Some(username) = change.str_field("username") {
            user.username = username.to_string();
            repo.update_user(&user)?;
        }
        let mut individual_changed = false;
        if let Some(email) = change.str_field("email") {
            individual.email = email.to_string();
            individual_changed = true;
        }
        if let Some(first_name) = change.str_field("first_name") {
            individual.first_name = first_name.to_string();
            individual_changed = true;
        }
        if let Some(last_name) = change.str_field("last_name") {
            individual.last_name = last_name.to_string();
            individual_changed = true;
        }
        if let Some(position) = change.str_field("position") {
            individual.position = Some(position.to_string());
            individual_changed = true;
        }
        if individual_changed {
            repo.update_individual(&individual)?;
        }

        Ok(ApplyOutcome {
            entry_id: entry.id,
            message: format!("User `{}` updated.", user.username),
            data: json!({ "user": user, "individual": individual }),
        })
    }
}

fn current_value(target: &EditTarget, field: &str) -> Option<Value> {
    let individual = &target.individual;
    match field {
        "username" => Some(json!(target.user.username)),
        "email" => Some(json!(individual.email)),
        "first_name" => Some(json!(individual.first_name)),
        "last_name" => Some(json!(individual.last_name)),
        "position" => individual.position.as_ref().map(|value| json!(value)),
        _ => None,
    }
}

fn display_origin(entry: &InboxEntry) -> &str {
    if entry.origin.is_empty() {
        "an unknown origin"
    } else {
        entry.origin.as_str()
    }
}
