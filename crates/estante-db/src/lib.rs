//! # estante-db: Document Store for Volta Estante
//!
//! This crate provides database access for Volta Estante.
//! It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Volta Estante Data Flow                            │
//! │                                                                         │
//! │  Engine call (InventoryEngine::add_copy)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    estante-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  book, sale,  │    │  (embedded)  │  │   │
//! │  │   │               │    │  user, sebo,  │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│  audit        │    │ 001_init.sql │  │   │
//! │  │   │ RetryPolicy   │    │       │       │    │              │  │   │
//! │  │   └───────────────┘    └───────┼───────┘    └──────────────┘  │   │
//! │  │                                ▼                               │   │
//! │  │                        ┌───────────────┐                      │   │
//! │  │                        │   resolver    │  ISBN-10 ⇄ ISBN-13    │   │
//! │  │                        └───────────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`retry`] - Retry of conflicting transactions
//! - [`resolver`] - ISBN identity resolution
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use estante_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./estante.db")).await?;
//! let book = db.books().fetch("sebo-1", "0140449132").await?;
//! ```

// =============================================================================
// Shared SQL
// =============================================================================

/// `SELECT <book columns> FROM books <tail>` as a static string.
///
/// Defined before the modules so the resolver and the book repository share it.
macro_rules! book_select {
    ($tail:literal) => {
        concat!(
            "SELECT isbn, title, authors, publisher, categories, published_date, description, ",
            "page_count, ratings_count, average_rating, language, thumbnail, small_thumbnail, ",
            "maturity_rating, text_snippet, total_quantity FROM books ",
            $tail
        )
    };
}

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod resolver;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use retry::RetryPolicy;

// Repository re-exports for convenience
pub use repository::audit::AuditLogRepository;
pub use repository::book::{AddedCopy, BookRepository};
pub use repository::sale::SaleRepository;
pub use repository::sebo::SeboRepository;
pub use repository::user::UserRepository;
