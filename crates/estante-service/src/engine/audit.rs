//! Audit log engine.
//!
//! Entries are appended after a mutation has already committed, so a failed
//! append never undoes the mutation; see [`crate::pipeline`].

use estante_core::validation::validate_log;
use estante_core::{AuditLogEntry, AuditLogPatch, NewLogEntry};
use estante_db::Database;
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct AuditEngine {
    db: Database,
}

impl AuditEngine {
    pub fn new(db: Database) -> Self {
        AuditEngine { db }
    }

    async fn ensure_sebo(&self, sebo_id: &str) -> ServiceResult<()> {
        if self.db.sebos().exists(sebo_id).await? {
            Ok(())
        } else {
            Err(ServiceError::not_found("Sebo", sebo_id))
        }
    }

    /// Validates and appends an entry.
    pub async fn record(&self, sebo_id: &str, entry: NewLogEntry) -> ServiceResult<AuditLogEntry> {
        validate_log(&entry)?;
        let entry = NewLogEntry {
            action: entry.action.trim().to_string(),
            user_name: entry.user_name.trim().to_string(),
            ..entry
        };
        Ok(self.db.audit_logs().append(sebo_id, &entry).await?)
    }

    pub async fn fetch_log(&self, sebo_id: &str, log_id: &str) -> ServiceResult<AuditLogEntry> {
        self.ensure_sebo(sebo_id).await?;
        self.db
            .audit_logs()
            .get(sebo_id, log_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("AuditLog", log_id))
    }

    /// Newest first.
    pub async fn fetch_all_logs(&self, sebo_id: &str) -> ServiceResult<Vec<AuditLogEntry>> {
        self.ensure_sebo(sebo_id).await?;
        let logs = self.db.audit_logs().list(sebo_id).await?;
        debug!(sebo_id = %sebo_id, count = logs.len(), "Audit log loaded");
        Ok(logs)
    }

    pub async fn update_log(
        &self,
        sebo_id: &str,
        log_id: &str,
        patch: &AuditLogPatch,
    ) -> ServiceResult<AuditLogEntry> {
        self.ensure_sebo(sebo_id).await?;
        Ok(self.db.audit_logs().update(sebo_id, log_id, patch).await?)
    }
}
