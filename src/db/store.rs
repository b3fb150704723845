/// Storage ports and their SQLite implementation
///
/// Managers depend on the `UserStore` / `GadgetStore` traits so that the
/// connection pool is injected once at startup rather than reached through a
/// global.
use crate::{
    db::models::{Gadget, SelfDestructCode, User},
    error::ApiResult,
    gadget::GadgetStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

const GADGET_COLUMNS: &str = "id, name, codename, status, created_at, decommissioned_at";

/// Partial update applied by `GadgetStore::update_gadget`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GadgetChanges {
    pub name: Option<String>,
    pub status: Option<GadgetStatus>,
}

impl GadgetChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.status.is_none()
    }
}

/// Result of an atomic confirm-and-destroy attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// Code claimed and gadget moved to Destroyed
    Destroyed(Gadget),
    /// No unused code with that value exists for the gadget
    CodeRejected,
    /// The gadget vanished or reached a terminal status before the claim
    GadgetUnavailable,
}

/// Credential store port
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> ApiResult<()>;

    async fn find_user_by_id(&self, id: &str) -> ApiResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> ApiResult<Option<User>>;
}

/// Gadget and self-destruct code store port
#[async_trait]
pub trait GadgetStore: Send + Sync {
    /// Newest first, optionally filtered by status
    async fn list_gadgets(&self, status: Option<GadgetStatus>) -> ApiResult<Vec<Gadget>>;

    async fn find_gadget(&self, id: &str) -> ApiResult<Option<Gadget>>;

    async fn codename_exists(&self, codename: &str) -> ApiResult<bool>;

    /// Fails with `Conflict` when the codename is already taken
    async fn insert_gadget(&self, gadget: &Gadget) -> ApiResult<()>;

    /// Returns `None` when no gadget has that id
    async fn update_gadget(&self, id: &str, changes: &GadgetChanges) -> ApiResult<Option<Gadget>>;

    /// Returns `None` when no gadget has that id
    async fn decommission_gadget(&self, id: &str, at: DateTime<Utc>) -> ApiResult<Option<Gadget>>;

    async fn insert_code(&self, code: &SelfDestructCode) -> ApiResult<()>;

    async fn list_codes(&self, gadget_id: &str) -> ApiResult<Vec<SelfDestructCode>>;

    /// Claim one unused matching code and destroy the gadget, both or neither
    async fn consume_code_and_destroy(
        &self,
        gadget_id: &str,
        code: &str,
        at: DateTime<Utc>,
    ) -> ApiResult<ConfirmOutcome>;
}

/// SQLite-backed implementation of both storage ports
#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn insert_user(&self, user: &User) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn find_user_by_id(&self, id: &str) -> ApiResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(User::from_row).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(User::from_row).transpose()
    }
}

#[async_trait]
impl GadgetStore for SqliteStore {
    async fn list_gadgets(&self, status: Option<GadgetStatus>) -> ApiResult<Vec<Gadget>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM gadgets WHERE status = ?1 ORDER BY created_at DESC",
                    GADGET_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM gadgets ORDER BY created_at DESC",
                    GADGET_COLUMNS
                ))
                .fetch_all(&self.db)
                .await?
            }
        };

        rows.iter().map(Gadget::from_row).collect()
    }

    async fn find_gadget(&self, id: &str) -> ApiResult<Option<Gadget>> {
        let row = sqlx::query(&format!("SELECT {} FROM gadgets WHERE id = ?1", GADGET_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(Gadget::from_row).transpose()
    }

    async fn codename_exists(&self, codename: &str) -> ApiResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM gadgets WHERE codename = ?1)")
                .bind(codename)
                .fetch_one(&self.db)
                .await?;

        Ok(exists)
    }

    async fn insert_gadget(&self, gadget: &Gadget) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO gadgets (id, name, codename, status, created_at, decommissioned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&gadget.id)
        .bind(&gadget.name)
        .bind(&gadget.codename)
        .bind(gadget.status.as_str())
        .bind(gadget.created_at)
        .bind(gadget.decommissioned_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn update_gadget(&self, id: &str, changes: &GadgetChanges) -> ApiResult<Option<Gadget>> {
        let row = sqlx::query(&format!(
            "UPDATE gadgets
             SET name = COALESCE(?1, name),
                 status = COALESCE(?2, status)
             WHERE id = ?3
             RETURNING {}",
            GADGET_COLUMNS
        ))
        .bind(&changes.name)
        .bind(changes.status.map(|s| s.as_str()))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Gadget::from_row).transpose()
    }

    async fn decommission_gadget(&self, id: &str, at: DateTime<Utc>) -> ApiResult<Option<Gadget>> {
        let row = sqlx::query(&format!(
            "UPDATE gadgets
             SET status = ?1,
                 decommissioned_at = ?2
             WHERE id = ?3
             RETURNING {}",
            GADGET_COLUMNS
        ))
        .bind(GadgetStatus::Decommissioned.as_str())
        .bind(at)
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Gadget::from_row).transpose()
    }

    async fn insert_code(&self, code: &SelfDestructCode) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO self_destruct_codes (id, gadget_id, code, used, used_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&code.id)
        .bind(&code.gadget_id)
        .bind(&code.code)
        .bind(code.used)
        .bind(code.used_at)
        .bind(code.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn list_codes(&self, gadget_id: &str) -> ApiResult<Vec<SelfDestructCode>> {
        let rows = sqlx::query(
            "SELECT id, gadget_id, code, used, used_at, created_at
             FROM self_destruct_codes
             WHERE gadget_id = ?1
             ORDER BY created_at",
        )
        .bind(gadget_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(SelfDestructCode::from_row).collect()
    }

    async fn consume_code_and_destroy(
        &self,
        gadget_id: &str,
        code: &str,
        at: DateTime<Utc>,
    ) -> ApiResult<ConfirmOutcome> {
        let mut tx = self.db.begin().await?;

        // Compare-and-set: only a row still at used = 0 can be claimed
        let claimed = sqlx::query(
            "UPDATE self_destruct_codes
             SET used = 1, used_at = ?1
             WHERE id = (
                 SELECT id FROM self_destruct_codes
                 WHERE gadget_id = ?2 AND code = ?3 AND used = 0
                 ORDER BY created_at
                 LIMIT 1
             )
             AND used = 0",
        )
        .bind(at)
        .bind(gadget_id)
        .bind(code)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ConfirmOutcome::CodeRejected);
        }

        let row = sqlx::query(&format!(
            "UPDATE gadgets
             SET status = ?1
             WHERE id = ?2 AND status NOT IN (?3, ?4)
             RETURNING {}",
            GADGET_COLUMNS
        ))
        .bind(GadgetStatus::Destroyed.as_str())
        .bind(gadget_id)
        .bind(GadgetStatus::Destroyed.as_str())
        .bind(GadgetStatus::Decommissioned.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            // Releases the claimed code as well
            tx.rollback().await?;
            return Ok(ConfirmOutcome::GadgetUnavailable);
        };

        let gadget = Gadget::from_row(&row)?;
        tx.commit().await?;

        Ok(ConfirmOutcome::Destroyed(gadget))
    }
}
