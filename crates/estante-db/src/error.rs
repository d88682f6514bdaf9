//! Store errors.
//!
//! ```text
//! sqlx::Error ──► DbError ──► ServiceError (estante-service)
//!                   │
//!                   ├─ Busy, PoolExhausted                    retried by `retry`
//!                   ├─ UniqueViolation, ForeignKeyViolation   bad reference
//!                   ├─ ConstraintViolation                    counter invariant broken
//!                   └─ NotFound, PreconditionFailed           decided inside a transaction
//! ```

use estante_core::ValidationError;
use thiserror::Error;

/// SQLite primary result codes that signal write contention.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A user id registered twice, or a sebo created twice.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A user pointing at a missing sebo, or a copy at a missing book.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation.
    ///
    /// ## When This Occurs
    /// - `total_quantity` decremented below zero (counter out of sync)
    /// - Negative price reached the store
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A merged record failed validation inside a transaction.
    #[error("Invalid record: {0}")]
    Invalid(#[from] ValidationError),

    /// A conditional write found the record in an unexpected state.
    ///
    /// ## When This Occurs
    /// - Promotion candidate stopped being an Editor after the check
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The store reported write contention (SQLITE_BUSY / SQLITE_LOCKED).
    ///
    /// Transient: retried until the retry policy gives up.
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No connection became free within the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Wraps a JSON column that failed to decode.
    pub fn corrupt(column: &str, err: serde_json::Error) -> Self {
        DbError::Internal(format!("Invalid JSON in column {}: {}", column, err))
    }

    /// True for errors worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }
}

/// Returns true when a SQLite result code (primary or extended) is BUSY/LOCKED.
///
/// Extended codes keep the primary code in the low byte:
/// 517 = SQLITE_BUSY_SNAPSHOT, 261 = SQLITE_BUSY_RECOVERY, 262 = SQLITE_LOCKED_SHAREDCACHE.
fn is_contention_code(code: &str) -> bool {
    match code.parse::<i64>() {
        Ok(code) => matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED),
        Err(_) => false,
    }
}

/// Classifies driver errors.
///
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → code/message analysis:
///     BUSY / LOCKED           → DbError::Busy
///     UNIQUE                  → DbError::UniqueViolation
///     FOREIGN KEY             → DbError::ForeignKeyViolation
///     CHECK                   → DbError::ConstraintViolation
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let contention = db_err.code().map(|c| is_contention_code(&c)).unwrap_or(false)
                    || msg.contains("database is locked")
                    || msg.contains("database table is locked")
                    || msg.contains("busy");

                if contention {
                    DbError::Busy(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::ConstraintViolation(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_codes() {
        assert!(is_contention_code("5"));
        assert!(is_contention_code("6"));
        assert!(is_contention_code("517"));
        assert!(is_contention_code("261"));
        assert!(is_contention_code("262"));
        assert!(!is_contention_code("19"));
        assert!(!is_contention_code("2067"));
        assert!(!is_contention_code("abc"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Busy("locked".to_string()).is_transient());
        assert!(DbError::PoolExhausted.is_transient());
        assert!(!DbError::not_found("Book", "123").is_transient());
        assert!(!DbError::ConstraintViolation("check".to_string()).is_transient());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
