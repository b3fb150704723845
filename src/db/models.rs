/// Database models for users, gadgets and self-destruct codes
use crate::{
    auth::Role,
    error::{ApiError, ApiResult},
    gadget::GadgetStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

/// User record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn from_row(row: &SqliteRow) -> ApiResult<Self> {
        let role: String = row.try_get("role")?;

        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            role: Role::from_str(&role)
                .map_err(|_| ApiError::Internal(format!("Stored user has invalid role: {:?}", role)))?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Gadget record in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gadget {
    pub id: String,
    pub name: String,
    pub codename: String,
    pub status: GadgetStatus,
    pub created_at: DateTime<Utc>,
    pub decommissioned_at: Option<DateTime<Utc>>,
}

impl Gadget {
    pub(crate) fn from_row(row: &SqliteRow) -> ApiResult<Self> {
        let status: String = row.try_get("status")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            codename: row.try_get("codename")?,
            status: GadgetStatus::from_str(&status).map_err(|_| {
                ApiError::Internal(format!("Stored gadget has unknown status: {}", status))
            })?,
            created_at: row.try_get("created_at")?,
            decommissioned_at: row.try_get("decommissioned_at")?,
        })
    }
}

/// One-time self-destruct confirmation code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfDestructCode {
    pub id: String,
    pub gadget_id: String,
    pub code: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SelfDestructCode {
    pub(crate) fn from_row(row: &SqliteRow) -> ApiResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            gadget_id: row.try_get("gadget_id")?,
            code: row.try_get("code")?,
            used: row.try_get("used")?,
            used_at: row.try_get("used_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
