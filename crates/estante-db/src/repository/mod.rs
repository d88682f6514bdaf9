//! # Repository Module
//!
//! Database repository implementations for Volta Estante.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Engine                                                                │
//! │       │                                                                 │
//! │       │  db.books().add_copy(sebo, &metadata, price, state)            │
//! │       ▼                                                                 │
//! │  BookRepository                                                        │
//! │  ├── RetryPolicy::run  ← re-runs the closure on BUSY                   │
//! │  │     └── BEGIN … resolve … write … COMMIT                            │
//! │  └── plain reads on a pooled connection                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation that changes `books.total_quantity` also writes `copies`
//! in the same transaction.
//!
//! ## Available Repositories
//!
//! - [`SeboRepository`](sebo::SeboRepository) - Tenants
//! - [`UserRepository`](user::UserRepository) - Accounts, registration, admin hand-over
//! - [`BookRepository`](book::BookRepository) - Books and copies
//! - [`SaleRepository`](sale::SaleRepository) - Sales (copy → sale conversion)
//! - [`AuditLogRepository`](audit::AuditLogRepository) - Audit trail

use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};

pub mod audit;
pub mod book;
pub mod sale;
pub mod sebo;
pub mod user;

/// Fails with `NotFound` unless the sebo exists.
pub(crate) async fn ensure_sebo(conn: &mut SqliteConnection, sebo_id: &str) -> DbResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sebos WHERE sebo_id = ?1")
        .bind(sebo_id)
        .fetch_optional(&mut *conn)
        .await?;

    match exists {
        Some(_) => Ok(()),
        None => Err(DbError::not_found("Sebo", sebo_id)),
    }
}

/// Encodes a list-valued field as JSON text.
pub(crate) fn to_json<T: serde::Serialize>(column: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::corrupt(column, e))
}

/// Decodes a JSON text column.
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw).map_err(|e| DbError::corrupt(column, e))
}
