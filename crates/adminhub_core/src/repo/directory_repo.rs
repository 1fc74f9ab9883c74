//! Directory repository: users, individuals and organisations.
//!
//! # Responsibility
//! - Provide the reads and writes inbox processors need to apply changes.
//!
//! # Invariants
//! - Usernames are unique case-insensitively (enforced by schema collation).
//! - Organisation names are unique.
//! - Every write bumps `modified_at`.

use crate::model::directory::{
    IndividualRecord, NewIndividual, NewOrganisation, OrganisationRecord, UserRecord,
};
use crate::repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const USER_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    username,
    individual_id,
    organisation_id,
    disabled
FROM users";

const INDIVIDUAL_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    email,
    first_name,
    last_name,
    position
FROM individuals";

const ORGANISATION_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    name,
    url,
    nationality,
    sector,
    type
FROM organisations";

/// Repository interface for directory records.
pub trait DirectoryRepository {
    fn get_user(&self, id: i64) -> RepoResult<Option<UserRecord>>;
    fn find_user_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>>;
    fn create_user(
        &self,
        username: &str,
        individual_id: i64,
        organisation_id: Option<i64>,
    ) -> RepoResult<UserRecord>;
    fn update_user(&self, user: &UserRecord) -> RepoResult<()>;
    fn get_individual(&self, id: i64) -> RepoResult<Option<IndividualRecord>>;
    fn create_individual(&self, individual: &NewIndividual) -> RepoResult<IndividualRecord>;
    fn update_individual(&self, individual: &IndividualRecord) -> RepoResult<()>;
    fn get_organisation(&self, id: i64) -> RepoResult<Option<OrganisationRecord>>;
    fn find_organisation_by_name(&self, name: &str) -> RepoResult<Option<OrganisationRecord>>;
    fn create_organisation(
        &self,
        organisation: &NewOrganisation,
    ) -> RepoResult<OrganisationRecord>;
}

/// SQLite-backed directory repository.
pub struct SqliteDirectoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDirectoryRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn required_user(&self, id: i64) -> RepoResult<UserRecord> {
        self.get_user(id)?
            .ok_or(RepoError::NotFound { entity: "user", id })
    }
}

impl DirectoryRepository for SqliteDirectoryRepository<'_> {
    fn get_user(&self, id: i64) -> RepoResult<Option<UserRecord>> {
        self.conn
            .query_row(
                &format!("{USER_SELECT_SQL} WHERE id = ?1;"),
                [id],
                |row| Ok(parse_user_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_user_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>> {
        self.conn
            .query_row(
                &format!("{USER_SELECT_SQL} WHERE username = ?1 COLLATE NOCASE;"),
                [username],
                |row| Ok(parse_user_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn create_user(
        &self,
        username: &str,
        individual_id: i64,
        organisation_id: Option<i64>,
    ) -> RepoResult<UserRecord> {
        self.conn.execute(
            "INSERT INTO users (uuid, username, individual_id, organisation_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                Uuid::new_v4().to_string(),
                username,
                individual_id,
                organisation_id
            ],
        )?;
        self.required_user(self.conn.last_insert_rowid())
    }

    fn update_user(&self, user: &UserRecord) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users
             SET
                username = ?1,
                individual_id = ?2,
                organisation_id = ?3,
                disabled = ?4,
                modified_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5;",
            params![
                user.username.as_str(),
                user.individual_id,
                user.organisation_id,
                user.disabled,
                user.id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "user",
                id: user.id,
            });
        }
        Ok(())
    }

    fn get_individual(&self, id: i64) -> RepoResult<Option<IndividualRecord>> {
        self.conn
            .query_row(
                &format!("{INDIVIDUAL_SELECT_SQL} WHERE id = ?1;"),
                [id],
                |row| Ok(parse_individual_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn create_individual(&self, individual: &NewIndividual) -> RepoResult<IndividualRecord> {
        self.conn.execute(
            "INSERT INTO individuals (uuid, email, first_name, last_name, position)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                Uuid::new_v4().to_string(),
                individual.email.as_str(),
                individual.first_name.as_str(),
                individual.last_name.as_str(),
                individual.position.as_deref(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_individual(id)?
            .ok_or(RepoError::NotFound { entity: "individual", id })
    }

    fn update_individual(&self, individual: &IndividualRecord) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE individuals
             SET
                email = ?1,
                first_name = ?2,
                last_name = ?3,
                position = ?4,
                modified_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5;",
            params![
                individual.email.as_str(),
                individual.first_name.as_str(),
                individual.last_name.as_str(),
                individual.position.as_deref(),
                individual.id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "individual",
                id: individual.id,
            });
        }
        Ok(())
    }

    fn get_organisation(&self, id: i64) -> RepoResult<Option<OrganisationRecord>> {
        self.conn
            .query_row(
                &format!("{ORGANISATION_SELECT_SQL} WHERE id = ?1;"),
                [id],
                |row| Ok(parse_organisation_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_organisation_by_name(&self, name: &str) -> RepoResult<Option<OrganisationRecord>> {
        self.conn
            .query_row(
                &format!("{ORGANISATION_SELECT_SQL} WHERE name = ?1 COLLATE NOCASE;"),
                [name],
                |row| Ok(parse_organisation_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn create_organisation(
        &self,
        organisation: &NewOrganisation,
    ) -> RepoResult<OrganisationRecord> {
        self.conn.execute(
            "INSERT INTO organisations (uuid, name, url, nationality, sector, type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                Uuid::new_v4().to_string(),
                organisation.name.as_str(),
                organisation.url.as_deref(),
                organisation.nationality.as_deref(),
                organisation.sector.as_deref(),
                organisation.kind.as_deref(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_organisation(id)?
            .ok_or(RepoError::NotFound { entity: "organisation", id })
    }
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<UserRecord> {
    let uuid_text: String = row.get("uuid")?;
    Ok(UserRecord {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid_text, "users.uuid")?,
        username: row.get("username")?,
        individual_id: row.get("individual_id")?,
        organisation_id: row.get("organisation_id")?,
        disabled: row.get("disabled")?,
    })
}

fn parse_individual_row(row: &Row<'_>) -> RepoResult<IndividualRecord> {
    let uuid_text: String = row.get("uuid")?;
    Ok(IndividualRecord {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid_text, "individuals.uuid")?,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        position: row.get("position")?,
    })
}

fn parse_organisation_row(row: &Row<'_>) -> RepoResult<OrganisationRecord> {
    let uuid_text: String = row.get("uuid")?;
    Ok(OrganisationRecord {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid_text, "organisations.uuid")?,
        name: row.get("name")?,
        url: row.get("url")?,
        nationality: row.get("nationality")?,
        sector: row.get("sector")?,
        kind: row.get("type")?,
    })
}
