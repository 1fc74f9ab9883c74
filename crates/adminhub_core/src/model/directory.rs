//! Directory records touched by inbox processors.
//!
//! These are read models over the `users`, `individuals` and `organisations`
//! tables. Only the fields processors need are carried.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub uuid: Uuid,
    pub username: String,
    pub individual_id: i64,
    pub organisation_id: Option<i64>,
    pub disabled: bool,
}

/// Person behind one or more user accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualRecord {
    pub id: i64,
    pub uuid: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
}

/// Organisation known to this instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationRecord {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub url: Option<String>,
    pub nationality: Option<String>,
    pub sector: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Insert shape for an individual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIndividual {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
}

/// Insert shape for an organisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrganisation {
    pub name: String,
    pub url: Option<String>,
    pub nationality: Option<String>,
    pub sector: Option<String>,
    pub kind: Option<String>,
}
