//! Organisation creation requests.

use crate::model::directory::NewOrganisation;
use crate::model::inbox::InboxEntry;
use crate::processor::fields::{check_url, optional_str, required_str};
use crate::processor::{
    ApplyOutcome, FieldChange, ProcessorError, ProcessorResult, RenderedView, RequestProcessor,
    ValidatedChange, ValidationError,
};
use crate::repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
use rusqlite::{Connection, Transaction};
use serde_json::json;

pub const ORGANISATION_CREATE_SCOPE: &str = "Organisation";
pub const ORGANISATION_CREATE_ACTION: &str = "Create";

const ORGANISATION_FIELDS: &[&str] = &["name", "url", "nationality", "sector", "type"];

pub struct OrganisationCreateProcessor;

impl OrganisationCreateProcessor {
    fn collect(
        &self,
        conn: &Connection,
        entry: &InboxEntry,
    ) -> ProcessorResult<(ValidatedChange, ValidationError)> {
        let repo = SqliteDirectoryRepository::new(conn);
        let payload = &entry.payload;
        let mut errors = ValidationError::new();
        let mut change = ValidatedChange::default();

        if let Some(name) = required_str(payload, "name", &mut errors) {
            if repo.find_organisation_by_name(&name)?.is_some() {
                errors.push("name", "an organisation with this name already exists");
            }
            change.set("name", name);
        }
        if let Some(url) = optional_str(payload, "url") {
            check_url(&url, &mut errors);
            change.set("url", url);
        }
        for key in ["nationality", "sector", "type"] {
            if let Some(value) = optional_str(payload, key) {
                change.set(key, value);
            }
        }

        Ok((change, errors))
    }
}

impl RequestProcessor for OrganisationCreateProcessor {
    fn validate(&self, conn: &Connection, entry: &InboxEntry) -> ProcessorResult<ValidatedChange> {
        let (change, errors) = self.collect(conn, entry)?;
        errors.into_result(change).map_err(ProcessorError::from)
    }

    fn render(&self, conn: &Connection, entry: &InboxEntry) -> ProcessorResult<RenderedView> {
        let (change, errors) = self.collect(conn, entry)?;
        let changes = ORGANISATION_FIELDS
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
                "Create organisation `{}`",
                change.str_field("name").unwrap_or("?")
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
        let organisation = repo.create_organisation(&NewOrganisation {
            name: change.str_field("name").unwrap_or_default().to_string(),
            url: change.str_field("url").map(str::to_string),
            nationality: change.str_field("nationality").map(str::to_string),
            sector: change.str_field("sector").map(str::to_string),
            kind: change.str_field("type").map(str::to_string),
        })?;

        Ok(ApplyOutcome {
            entry_id: entry.id,
            message: format!("Organisation `{}` created.", organisation.name),
            data: json!({ "organisation": organisation }),
        })
    }
}
