//! # Service Error Type
//!
//! The one error type every engine and the pipeline return.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ValidationError / CoreError (estante-core)                             │
//! │  DbError (estante-db)                                                   │
//! │  collaborator failures (metadata, identity, claims, token)              │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ServiceError ── status_code() → 400 / 401 / 403 / 404 / 409 / 5xx      │
//! │               └─ code()        → "NOT_FOUND", "VALIDATION_ERROR", …     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use estante_core::{CoreError, ValidationError};
use estante_db::DbError;
use thiserror::Error;

/// Errors surfaced to callers of the service layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// Malformed input shape.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced sebo, book, copy, user, sale or log entry is absent.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate creation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authorization or business-rule violation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid bearer token.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// An atomic operation could not commit.
    #[error("Transaction failed: {0}")]
    TransactionFailure(String),

    /// An external collaborator failed.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        ServiceError::NotFound(format!("{} not found: {}", entity, id))
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        ServiceError::Forbidden(reason.into())
    }

    /// HTTP status an outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::Unauthenticated(_) => 401,
            ServiceError::Forbidden(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::TransactionFailure(_) => 500,
            ServiceError::Upstream(_) => 502,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::Unauthenticated(_) => "UNAUTHENTICATED",
            ServiceError::TransactionFailure(_) => "TRANSACTION_FAILURE",
            ServiceError::Upstream(_) => "UPSTREAM_ERROR",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Forbidden(reason) => ServiceError::Forbidden(reason),
            CoreError::Validation(e) => e.into(),
        }
    }
}

/// Converts database errors to service errors.
impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => {
                ServiceError::Conflict(format!("{} '{}' already exists", field, value))
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::warn!("Foreign key violation: {}", message);
                ServiceError::Validation("Invalid reference".to_string())
            }
            DbError::Invalid(e) => e.into(),
            DbError::PreconditionFailed(reason) => ServiceError::Forbidden(reason),
            DbError::ConstraintViolation(e) => {
                tracing::error!("Invariant violated inside transaction: {}", e);
                ServiceError::TransactionFailure(e)
            }
            DbError::Busy(e) => {
                tracing::error!("Transaction gave up after retries: {}", e);
                ServiceError::TransactionFailure(e)
            }
            DbError::PoolExhausted => {
                ServiceError::TransactionFailure("Database pool exhausted".to_string())
            }
            DbError::ConnectionFailed(e)
            | DbError::MigrationFailed(e)
            | DbError::QueryFailed(e)
            | DbError::Internal(e) => {
                tracing::error!("Database error: {}", e);
                ServiceError::Internal("Database operation failed".to_string())
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_map_to_taxonomy() {
        let cases = [
            (DbError::not_found("Book", "978"), 404),
            (DbError::duplicate("user_id", "u1"), 409),
            (DbError::Busy("locked".to_string()), 500),
            (DbError::ConstraintViolation("CHECK".to_string()), 500),
            (DbError::PreconditionFailed("not editor".to_string()), 403),
            (DbError::Invalid(ValidationError::required("isbn")), 400),
        ];

        for (db_err, status) in cases {
            assert_eq!(ServiceError::from(db_err).status_code(), status);
        }
    }

    #[test]
    fn test_not_found_message() {
        let err = ServiceError::from(DbError::not_found("Copy", "c-1"));
        assert_eq!(err.to_string(), "Copy not found: c-1");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_core_errors() {
        assert_eq!(
            ServiceError::from(CoreError::forbidden("nope")),
            ServiceError::Forbidden("nope".to_string())
        );
        assert!(ServiceError::from(ValidationError::required("title")).is_client_error());
        assert!(!ServiceError::Upstream("down".to_string()).is_client_error());
    }
}
