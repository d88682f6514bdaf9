//! # Store Handle
//!
//! Opens the SQLite file that backs every sebo and hands out repositories.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig ──► Database::new ──► migrations ──► Database (Clone)        │
//! │                                                    │                    │
//! │        ┌──────────────┬──────────────┬─────────────┼──────────────┐     │
//! │        ▼              ▼              ▼             ▼              ▼     │
//! │    sebos()        users()        books()       sales()    audit_logs()  │
//! │                      │              │             │              │     │
//! │                      └──────────────┴──── RetryPolicy ───────────┘     │
//! │                               (transactions retried on BUSY)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! File databases run in WAL mode with `synchronous = NORMAL` and foreign
//! keys on, so book deletions cascade to their copies. `:memory:` databases
//! live inside a single pinned connection.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::audit::AuditLogRepository;
use crate::repository::book::BookRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::sebo::SeboRepository;
use crate::repository::user::UserRepository;
use crate::retry::RetryPolicy;

/// Path marker for a private in-memory database.
const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust
/// use estante_db::DbConfig;
/// use std::time::Duration;
///
/// let config = DbConfig::new("/path/to/estante.db")
///     .max_connections(5)
///     .min_connections(1)
///     .tx_retry_budget(Duration::from_secs(2));
/// assert_eq!(config.max_connections, 5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`
    pub database_path: PathBuf,

    pub max_connections: u32,
    pub min_connections: u32,

    /// How long to wait for a free connection (default 30s)
    pub connect_timeout: Duration,

    /// `None` keeps idle connections open
    pub idle_timeout: Option<Duration>,

    pub run_migrations: bool,

    /// Applied to every transactional repository call
    pub retry: RetryPolicy,
}

impl DbConfig {
    /// File-backed configuration; the file is created on first connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
            retry: RetryPolicy::default(),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Sets how long a conflicting transaction keeps being retried.
    pub fn tx_retry_budget(mut self, budget: Duration) -> Self {
        self.retry = RetryPolicy::with_max_elapsed(budget);
        self
    }

    /// Private in-memory database for tests.
    ///
    /// Each connection to `:memory:` is a separate database, so the pool
    /// holds exactly one connection and never reaps it.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            run_migrations: true,
            retry: RetryPolicy::default(),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        Ok(options
            .synchronous(SqliteSynchronous::Normal)
            // copies cascade from books
            .foreign_keys(true))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the store. Created once at startup and injected into every
/// engine; clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl Database {
    /// Connects and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let connect_options = config.connect_options()?;
        debug!(path = %config.database_path.display(), "Opening store");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);

        if config.is_in_memory() {
            // Recycling the only connection would drop the whole database.
            pool_options = pool_options.max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            in_memory = config.is_in_memory(),
            "Store opened"
        );

        let db = Database {
            pool,
            retry: config.retry,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn sebos(&self) -> SeboRepository {
        SeboRepository::new(self.pool.clone())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone(), self.retry)
    }

    /// Books, copies and identity resolution.
    pub fn books(&self) -> BookRepository {
        BookRepository::new(self.pool.clone(), self.retry)
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone(), self.retry)
    }

    pub fn audit_logs(&self) -> AuditLogRepository {
        AuditLogRepository::new(self.pool.clone(), self.retry)
    }

    /// Closes the pool; later repository calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Store closed");
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
