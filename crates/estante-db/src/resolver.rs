//! # Identity Resolver
//!
//! Finds the one stored book behind a user-supplied ISBN.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  input "0-14-044913-2"                                                  │
//! │       │ sanitize + convert                                              │
//! │       ▼                                                                 │
//! │  candidates: 9780140449136 (preferred), 0140449132                     │
//! │       │                                                                 │
//! │       ▼  ONE query:  WHERE sebo_id = ? AND isbn IN (?, ?)              │
//! │  ┌────────────────────┬───────────────────────────────────────────┐    │
//! │  │ row under 13-digit │ → key = 13-digit, snapshot                │    │
//! │  │ row under 10-digit │ → key = 10-digit, snapshot (legacy data)  │    │
//! │  │ no row             │ → key = 13-digit, no snapshot             │    │
//! │  └────────────────────┴───────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Not found is a normal result here. Callers decide whether it is an error.
//! The resolver takes a connection so it can run inside a caller's transaction.

use estante_core::isbn::IsbnForms;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::book::{BookRecord, BookRow};

/// Outcome of resolving an ISBN within one sebo.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The document key to read or write. Empty when the input had no digits.
    pub key: String,

    /// The stored book, when one exists under `key`.
    pub snapshot: Option<BookRecord>,
}

impl Resolution {
    pub fn exists(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Resolves `raw_isbn` against the books of `sebo_id` with a single query.
pub async fn resolve(
    conn: &mut SqliteConnection,
    sebo_id: &str,
    raw_isbn: &str,
) -> DbResult<Resolution> {
    let forms = IsbnForms::from_raw(raw_isbn);

    if forms.is_empty() {
        return Ok(Resolution {
            key: String::new(),
            snapshot: None,
        });
    }

    let preferred = forms.isbn13.as_str();
    let legacy = forms.isbn10.as_deref().unwrap_or(preferred);

    let rows: Vec<BookRow> = sqlx::query_as(book_select!(
        "WHERE sebo_id = ?1 AND isbn IN (?2, ?3)"
    ))
    .bind(sebo_id)
    .bind(preferred)
    .bind(legacy)
    .fetch_all(&mut *conn)
    .await?;

    let mut found = None;
    for key in forms.candidates() {
        if let Some(row) = rows.iter().find(|row| row.isbn == key) {
            found = Some(row.clone());
            break;
        }
    }

    let resolution = match found {
        Some(row) => Resolution {
            key: row.isbn.clone(),
            snapshot: Some(BookRecord::try_from(row)?),
        },
        None => Resolution {
            key: forms.isbn13.clone(),
            snapshot: None,
        },
    };

    debug!(
        sebo_id = %sebo_id,
        input = %raw_isbn,
        key = %resolution.key,
        exists = resolution.exists(),
        "Resolved ISBN"
    );

    Ok(resolution)
}

// =============================================================================
// Unit Tests
// =============================================================================
