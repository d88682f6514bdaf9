//! # Audit Log Repository
//!
//! Append-mostly record of administrative actions, one table per store
//! and keyed by sebo. Entries are written after the action they describe
//! has committed, never inside its transaction.

use chrono::{DateTime, Utc};
use estante_core::{AuditLogEntry, AuditLogPatch, NewLogEntry};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{ensure_sebo, from_json, to_json};
use crate::retry::RetryPolicy;

#[derive(Debug, FromRow)]
struct AuditLogRow {
    log_id: String,
    user_id: String,
    user_name: String,
    action: String,
    details: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<AuditLogRow> for AuditLogEntry {
    type Error = DbError;

    fn try_from(row: AuditLogRow) -> DbResult<Self> {
        Ok(AuditLogEntry {
            log_id: row.log_id,
            user_id: row.user_id,
            user_name: row.user_name,
            action: row.action,
            details: from_json("details", &row.details)?,
            timestamp: row.timestamp,
        })
    }
}

/// Repository for audit log entries.
#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl AuditLogRepository {
    /// Creates a new AuditLogRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        AuditLogRepository { pool, retry }
    }

    /// Stores a new entry with a fresh id and the current time.
    pub async fn append(&self, sebo_id: &str, entry: &NewLogEntry) -> DbResult<AuditLogEntry> {
        let stored = AuditLogEntry {
            log_id: Uuid::new_v4().to_string(),
            user_id: entry.user_id.clone(),
            user_name: entry.user_name.clone(),
            action: entry.action.clone(),
            details: entry.details.clone(),
            timestamp: Utc::now(),
        };
        let details = to_json("details", &stored.details)?;

        let mut conn = self.pool.acquire().await?;
        ensure_sebo(&mut conn, sebo_id).await?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (sebo_id, log_id, user_id, user_name, action, details, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(sebo_id)
        .bind(&stored.log_id)
        .bind(&stored.user_id)
        .bind(&stored.user_name)
        .bind(&stored.action)
        .bind(details)
        .bind(stored.timestamp)
        .execute(&mut *conn)
        .await?;

        debug!(sebo_id = %sebo_id, action = %stored.action, log_id = %stored.log_id, "Audit entry appended");
        Ok(stored)
    }

    /// Gets one entry.
    pub async fn get(&self, sebo_id: &str, log_id: &str) -> DbResult<Option<AuditLogEntry>> {
        let row: Option<AuditLogRow> = sqlx::query_as(
            r#"
            SELECT log_id, user_id, user_name, action, details, timestamp
            FROM audit_logs
            WHERE sebo_id = ?1 AND log_id = ?2
            "#,
        )
        .bind(sebo_id)
        .bind(log_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AuditLogEntry::try_from).transpose()
    }

    /// Lists the entries of a sebo, newest first.
    pub async fn list(&self, sebo_id: &str) -> DbResult<Vec<AuditLogEntry>> {
        let rows: Vec<AuditLogRow> = sqlx::query_as(
            r#"
            SELECT log_id, user_id, user_name, action, details, timestamp
            FROM audit_logs
            WHERE sebo_id = ?1
            ORDER BY timestamp DESC, rowid DESC
            "#,
        )
        .bind(sebo_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    /// Corrects the action or details of an entry.
    pub async fn update(
        &self,
        sebo_id: &str,
        log_id: &str,
        patch: &AuditLogPatch,
    ) -> DbResult<AuditLogEntry> {
        self.retry
            .run("update_audit_log", move || self.update_once(sebo_id, log_id, patch))
            .await
    }

    async fn update_once(
        &self,
        sebo_id: &str,
        log_id: &str,
        patch: &AuditLogPatch,
    ) -> DbResult<AuditLogEntry> {
        let mut tx = self.pool.begin().await?;

        let row: Option<AuditLogRow> = sqlx::query_as(
            r#"
            SELECT log_id, user_id, user_name, action, details, timestamp
            FROM audit_logs
            WHERE sebo_id = ?1 AND log_id = ?2
            "#,
        )
        .bind(sebo_id)
        .bind(log_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current = match row {
            Some(row) => AuditLogEntry::try_from(row)?,
            None => return Err(DbError::not_found("AuditLog", log_id)),
        };
        let merged = patch.apply(&current)?;

        sqlx::query("UPDATE audit_logs SET action = ?3, details = ?4 WHERE sebo_id = ?1 AND log_id = ?2")
            .bind(sebo_id)
            .bind(log_id)
            .bind(&merged.action)
            .bind(to_json("details", &merged.details)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(sebo_id = %sebo_id, log_id = %log_id, "Audit entry updated");
        Ok(merged)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use estante_core::LogDetails;
    use serde_json::json;

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "INSERT INTO sebos (sebo_id, owner_user_id, display_name, created_at)
             VALUES ('s1', 'u1', 'Sebo do Centro', '2026-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        db
    }

    fn entry(action: &str) -> NewLogEntry {
        let mut details = LogDetails::new();
        details.insert("isbn".to_string(), json!("9780140449136"));
        NewLogEntry {
            user_id: "u1".to_string(),
            user_name: "Ana".to_string(),
            action: action.to_string(),
            details,
        }
    }

    #[tokio::test]
    async fn test_append_and_list_newest_first() {
        let db = setup().await;

        db.audit_logs().append("s1", &entry("add_copy")).await.unwrap();
        db.audit_logs().append("s1", &entry("create_sale")).await.unwrap();

        let logs = db.audit_logs().list("s1").await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, "create_sale");
        assert_eq!(logs[1].details.get("isbn"), Some(&json!("9780140449136")));
    }

    #[tokio::test]
    async fn test_append_to_missing_sebo() {
        let db = setup().await;
        let result = db.audit_logs().append("s9", &entry("add_copy")).await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_entry() {
        let db = setup().await;
        let stored = db.audit_logs().append("s1", &entry("add_copy")).await.unwrap();

        let patch = AuditLogPatch {
            action: Some("add_copy_manual".to_string()),
            details: None,
        };
        let updated = db
            .audit_logs()
            .update("s1", &stored.log_id, &patch)
            .await
            .unwrap();
        assert_eq!(updated.action, "add_copy_manual");
        assert_eq!(updated.details, stored.details);

        let missing = db.audit_logs().update("s1", "nope", &patch).await;
        assert!(matches!(missing, Err(DbError::NotFound { .. })));
    }
}
