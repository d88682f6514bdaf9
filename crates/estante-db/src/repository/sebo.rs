//! # Sebo Repository
//!
//! Tenants. A sebo is created together with its first Admin by
//! [`UserRepository::register`](super::user::UserRepository::register);
//! this repository only reads them (plus a plain insert for seeding).

use chrono::{DateTime, Utc};
use estante_core::Sebo;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct SeboRow {
    sebo_id: String,
    owner_user_id: String,
    display_name: String,
    created_at: DateTime<Utc>,
}

impl From<SeboRow> for Sebo {
    fn from(row: SeboRow) -> Self {
        Sebo {
            sebo_id: row.sebo_id,
            owner_user_id: row.owner_user_id,
            display_name: row.display_name,
            created_at: row.created_at,
        }
    }
}

/// Writes a sebo row on the given connection.
pub(crate) async fn insert_sebo(conn: &mut SqliteConnection, sebo: &Sebo) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sebos (sebo_id, owner_user_id, display_name, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&sebo.sebo_id)
    .bind(&sebo.owner_user_id)
    .bind(&sebo.display_name)
    .bind(sebo.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Repository for sebo lookups.
#[derive(Debug, Clone)]
pub struct SeboRepository {
    pool: SqlitePool,
}

impl SeboRepository {
    /// Creates a new SeboRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SeboRepository { pool }
    }

    /// Gets a sebo by id.
    pub async fn get(&self, sebo_id: &str) -> DbResult<Option<Sebo>> {
        debug!(sebo_id = %sebo_id, "Fetching sebo");

        let row: Option<SeboRow> = sqlx::query_as(
            "SELECT sebo_id, owner_user_id, display_name, created_at FROM sebos WHERE sebo_id = ?1",
        )
        .bind(sebo_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Sebo::from))
    }

    pub async fn exists(&self, sebo_id: &str) -> DbResult<bool> {
        Ok(self.get(sebo_id).await?.is_some())
    }

    /// Inserts a sebo with no users.
    pub async fn insert(&self, sebo: &Sebo) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_sebo(&mut conn, sebo).await?;
        debug!(sebo_id = %sebo.sebo_id, "Sebo inserted");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig, DbError};

    fn sebo(id: &str) -> Sebo {
        Sebo {
            sebo_id: id.to_string(),
            owner_user_id: "u1".to_string(),
            display_name: "Sebo do Centro".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.sebos().insert(&sebo("s1")).await.unwrap();

        let found = db.sebos().get("s1").await.unwrap().unwrap();
        assert_eq!(found.display_name, "Sebo do Centro");
        assert!(db.sebos().exists("s1").await.unwrap());
        assert!(!db.sebos().exists("s2").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_sebo_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.sebos().insert(&sebo("s1")).await.unwrap();
        let result = db.sebos().insert(&sebo("s1")).await;

        assert!(matches!(result, Err(DbError::UniqueViolation { .. })));
    }
}
