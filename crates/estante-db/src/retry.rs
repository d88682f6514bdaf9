//! # Transaction Retry
//!
//! Re-runs a whole transaction when SQLite reports write contention.
//!
//! ## Why Retry?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two requests add a copy of the same book at the same time:            │
//! │                                                                         │
//! │   Request A: BEGIN ─ SELECT book ─ UPDATE qty+1 ─ INSERT copy ─ COMMIT  │
//! │   Request B: BEGIN ─ SELECT book ─ UPDATE ✗ SQLITE_BUSY_SNAPSHOT        │
//! │                                       │                                 │
//! │                                       ▼                                 │
//! │              rollback, wait (exponential), run B from BEGIN again      │
//! │                                                                         │
//! │  Every attempt re-reads everything, so B never writes a counter        │
//! │  derived from a stale read.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only [`crate::DbError::is_transient`] errors are retried. Everything else
//! (not found, constraint violations, validation) fails on the first attempt.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use tracing::warn;

use crate::error::DbResult;

/// Retry settings for transactional operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// First wait after a conflict.
    pub initial_interval: Duration,

    /// Upper bound of a single wait.
    pub max_interval: Duration,

    /// Give up (returning the last `Busy`) after this much time.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(250),
            max_elapsed: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Default intervals with a custom overall budget.
    pub fn with_max_elapsed(max_elapsed: Duration) -> Self {
        RetryPolicy {
            max_elapsed,
            ..Default::default()
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// `operation` must start its own transaction on every call.
    pub async fn run<T, F, Fut>(&self, name: &'static str, mut operation: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build();

        backoff::future::retry(backoff, || {
            let attempt = operation();
            async move {
                attempt.await.map_err(|err| {
                    if err.is_transient() {
                        warn!(operation = name, error = %err, "Transaction conflict, retrying");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_retries_busy_until_success() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result = fast()
            .run("test", move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DbError::Busy("locked".to_string()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: DbResult<()> = fast()
            .run("test", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(DbError::not_found("Book", "123"))
            })
            .await;

        assert!(matches!(result, Err(DbError::NotFound { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_with_busy() {
        let result: DbResult<()> = fast()
            .run("test", || async { Err(DbError::Busy("locked".to_string())) })
            .await;

        assert!(matches!(result, Err(DbError::Busy(_))));
    }
}
