//! # User Repository
//!
//! Accounts and their tenant membership.
//!
//! ## Admin Hand-over
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  promote_and_delete(admin, candidate, sebo)    ONE transaction          │
//! │                                                                         │
//! │   UPDATE users SET role = 'admin'                                       │
//! │    WHERE user_id = candidate AND sebo_id = sebo AND role = 'editor'     │
//! │        │                                                                │
//! │        ├── 0 rows → PreconditionFailed, nothing written                 │
//! │        ▼                                                                │
//! │   DELETE users WHERE user_id = admin                                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   UPDATE sebos SET owner_user_id = candidate (if admin owned it)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `remove_member` applies the same owner transfer when an Admin removes
//! the owning account.
//!
//! The conditional UPDATE re-checks the candidate inside the transaction,
//! so a role change racing the hand-over cannot leave a sebo without an Admin.

use chrono::{DateTime, Utc};
use estante_core::{Role, Sebo, User, UserPatch};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::ensure_sebo;
use crate::repository::sebo::insert_sebo;
use crate::retry::RetryPolicy;

#[derive(Debug, FromRow)]
struct UserRow {
    user_id: String,
    name: String,
    email: String,
    sebo_id: String,
    role: Role,
    registered_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: row.user_id,
            name: row.name,
            email: row.email,
            sebo_id: row.sebo_id,
            role: row.role,
            registered_at: row.registered_at,
        }
    }
}

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        UserRepository { pool, retry }
    }

    /// Gets a user by id.
    pub async fn get(&self, user_id: &str) -> DbResult<Option<User>> {
        debug!(user_id = %user_id, "Fetching user");

        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT user_id, name, email, sebo_id, role, registered_at
            FROM users
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    /// Lists the users of one sebo, oldest first.
    pub async fn list_by_sebo(&self, sebo_id: &str) -> DbResult<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT user_id, name, email, sebo_id, role, registered_at
            FROM users
            WHERE sebo_id = ?1
            ORDER BY registered_at, user_id
            "#,
        )
        .bind(sebo_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Stores a new user, creating its sebo first when `new_sebo` is given.
    ///
    /// Without `new_sebo` the user's sebo must already exist.
    /// A second registration of the same user id fails with `UniqueViolation`.
    pub async fn register(&self, user: &User, new_sebo: Option<&Sebo>) -> DbResult<()> {
        self.retry
            .run("register_user", move || self.register_once(user, new_sebo))
            .await?;

        info!(
            user_id = %user.user_id,
            sebo_id = %user.sebo_id,
            role = %user.role,
            created_sebo = new_sebo.is_some(),
            "User registered"
        );
        Ok(())
    }

    async fn register_once(&self, user: &User, new_sebo: Option<&Sebo>) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let taken: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE user_id = ?1")
            .bind(&user.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(DbError::duplicate("user_id", &user.user_id));
        }

        match new_sebo {
            Some(sebo) => insert_sebo(&mut tx, sebo).await?,
            None => ensure_sebo(&mut tx, &user.sebo_id).await?,
        }

        sqlx::query(
            r#"
            INSERT INTO users (user_id, name, email, sebo_id, role, registered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.sebo_id)
        .bind(user.role)
        .bind(user.registered_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Applies a name/role patch and returns the stored result.
    pub async fn update(&self, user_id: &str, patch: &UserPatch) -> DbResult<User> {
        let user = self
            .retry
            .run("update_user", move || self.update_once(user_id, patch))
            .await?;

        debug!(user_id = %user_id, role = %user.role, "User updated");
        Ok(user)
    }

    async fn update_once(&self, user_id: &str, patch: &UserPatch) -> DbResult<User> {
        let mut tx = self.pool.begin().await?;

        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT user_id, name, email, sebo_id, role, registered_at
            FROM users
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current = row
            .map(User::from)
            .ok_or_else(|| DbError::not_found("User", user_id))?;
        let merged = patch.apply(&current)?;

        sqlx::query("UPDATE users SET name = ?2, role = ?3 WHERE user_id = ?1")
            .bind(user_id)
            .bind(&merged.name)
            .bind(merged.role)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(merged)
    }

    /// Deletes a user record.
    pub async fn delete(&self, user_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", user_id));
        }

        info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    /// Removes `user_id` from `sebo_id` on behalf of the Admin `remover_id`.
    ///
    /// When the removed account owned the sebo, ownership moves to the
    /// remover in the same transaction.
    pub async fn remove_member(
        &self,
        user_id: &str,
        sebo_id: &str,
        remover_id: &str,
    ) -> DbResult<()> {
        self.retry
            .run("remove_member", move || {
                self.remove_member_once(user_id, sebo_id, remover_id)
            })
            .await?;

        info!(sebo_id = %sebo_id, user_id = %user_id, removed_by = %remover_id, "Member removed");
        Ok(())
    }

    async fn remove_member_once(
        &self,
        user_id: &str,
        sebo_id: &str,
        remover_id: &str,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM users WHERE user_id = ?1 AND sebo_id = ?2")
            .bind(user_id)
            .bind(sebo_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(DbError::not_found("User", user_id));
        }

        let moved = sqlx::query(
            "UPDATE sebos SET owner_user_id = ?2 WHERE sebo_id = ?1 AND owner_user_id = ?3",
        )
        .bind(sebo_id)
        .bind(remover_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() > 0 {
            debug!(sebo_id = %sebo_id, owner = %remover_id, "Sebo ownership moved");
        }

        tx.commit().await?;
        Ok(())
    }

    /// Promotes an Editor of `sebo_id` to Admin and deletes `admin_id`, atomically.
    ///
    /// Fails with `PreconditionFailed` when the candidate is no longer an
    /// Editor of that sebo at write time.
    pub async fn promote_and_delete(
        &self,
        admin_id: &str,
        candidate_id: &str,
        sebo_id: &str,
    ) -> DbResult<()> {
        self.retry
            .run("promote_and_delete", move || {
                self.promote_and_delete_once(admin_id, candidate_id, sebo_id)
            })
            .await?;

        info!(
            sebo_id = %sebo_id,
            deleted = %admin_id,
            promoted = %candidate_id,
            "Admin handed over"
        );
        Ok(())
    }

    async fn promote_and_delete_once(
        &self,
        admin_id: &str,
        candidate_id: &str,
        sebo_id: &str,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let promoted = sqlx::query(
            r#"
            UPDATE users SET role = 'admin'
            WHERE user_id = ?1 AND sebo_id = ?2 AND role = 'editor'
            "#,
        )
        .bind(candidate_id)
        .bind(sebo_id)
        .execute(&mut *tx)
        .await?;

        if promoted.rows_affected() == 0 {
            return Err(DbError::PreconditionFailed(format!(
                "{} is not an editor of sebo {}",
                candidate_id, sebo_id
            )));
        }

        let deleted = sqlx::query("DELETE FROM users WHERE user_id = ?1 AND sebo_id = ?2")
            .bind(admin_id)
            .bind(sebo_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(DbError::not_found("User", admin_id));
        }

        sqlx::query("UPDATE sebos SET owner_user_id = ?2 WHERE sebo_id = ?1 AND owner_user_id = ?3")
            .bind(sebo_id)
            .bind(candidate_id)
            .bind(admin_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn user(id: &str, sebo: &str, role: Role) -> User {
        User {
            user_id: id.to_string(),
            name: format!("User {}", id),
            email: format!("{}@example.com", id),
            sebo_id: sebo.to_string(),
            role,
            registered_at: Utc::now(),
        }
    }

    fn sebo(id: &str, owner: &str) -> Sebo {
        Sebo {
            sebo_id: id.to_string(),
            owner_user_id: owner.to_string(),
            display_name: "Sebo do Centro".to_string(),
            created_at: Utc::now(),
        }
    }

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users()
            .register(&user("admin", "s1", Role::Admin), Some(&sebo("s1", "admin")))
            .await
            .unwrap();
        db.users()
            .register(&user("ed", "s1", Role::Editor), None)
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_register_creates_sebo_and_user() {
        let db = setup().await;

        let admin = db.users().get("admin").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(
            db.sebos().get("s1").await.unwrap().unwrap().owner_user_id,
            "admin"
        );
        assert_eq!(db.users().list_by_sebo("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_register_twice_conflicts() {
        let db = setup().await;
        let result = db.users().register(&user("ed", "s1", Role::Reader), None).await;
        assert!(matches!(result, Err(DbError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn test_register_into_missing_sebo() {
        let db = setup().await;
        let result = db.users().register(&user("x", "nowhere", Role::Reader), None).await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
        assert!(db.users().get("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let db = setup().await;
        let patch = UserPatch {
            name: Some("Edna".to_string()),
            role: Some(Role::Reader),
        };

        let updated = db.users().update("ed", &patch).await.unwrap();
        assert_eq!(updated.name, "Edna");
        assert_eq!(updated.role, Role::Reader);
        assert_eq!(db.users().get("ed").await.unwrap().unwrap().role, Role::Reader);
    }

    #[tokio::test]
    async fn test_promote_and_delete() {
        let db = setup().await;

        db.users().promote_and_delete("admin", "ed", "s1").await.unwrap();

        assert!(db.users().get("admin").await.unwrap().is_none());
        assert_eq!(db.users().get("ed").await.unwrap().unwrap().role, Role::Admin);
        assert_eq!(db.sebos().get("s1").await.unwrap().unwrap().owner_user_id, "ed");
    }

    #[tokio::test]
    async fn test_promote_non_editor_writes_nothing() {
        let db = setup().await;
        db.users()
            .register(&user("rd", "s1", Role::Reader), None)
            .await
            .unwrap();

        let result = db.users().promote_and_delete("admin", "rd", "s1").await;
        assert!(matches!(result, Err(DbError::PreconditionFailed(_))));

        assert!(db.users().get("admin").await.unwrap().is_some());
        assert_eq!(db.users().get("rd").await.unwrap().unwrap().role, Role::Reader);
    }

    #[tokio::test]
    async fn test_remove_owner_moves_ownership() {
        let db = setup().await;
        db.users()
            .register(&user("boss", "s1", Role::Admin), None)
            .await
            .unwrap();

        db.users().remove_member("admin", "s1", "boss").await.unwrap();

        assert!(db.users().get("admin").await.unwrap().is_none());
        assert_eq!(db.sebos().get("s1").await.unwrap().unwrap().owner_user_id, "boss");
    }

    #[tokio::test]
    async fn test_remove_non_owner_keeps_owner() {
        let db = setup().await;

        db.users().remove_member("ed", "s1", "admin").await.unwrap();

        assert!(db.users().get("ed").await.unwrap().is_none());
        assert_eq!(db.sebos().get("s1").await.unwrap().unwrap().owner_user_id, "admin");
    }

    #[tokio::test]
    async fn test_remove_member_of_other_sebo() {
        let db = setup().await;
        assert!(matches!(
            db.users().remove_member("ed", "s2", "admin").await,
            Err(DbError::NotFound { .. })
        ));
        assert!(db.users().get("ed").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_user() {
        let db = setup().await;
        assert!(matches!(
            db.users().delete("ghost").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
