//! # Book Repository
//!
//! Books and their copies, the one place `total_quantity` is written.
//!
//! ## Counter Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operation      │ Inside ONE transaction                               │
//! │  ───────────────┼───────────────────────────────────────────────────── │
//! │  add_copy       │ resolve → upsert book (qty = 1 | qty + 1) → +copy    │
//! │  delete_copy    │ resolve → -copy → qty - 1                            │
//! │  delete_book    │ resolve → -all copies → -book                        │
//! │  reconcile      │ resolve → COUNT(copies) → qty = count                │
//! │  update_copy    │ resolve → read copy → merge + validate → write copy  │
//! │                                                                         │
//! │  Sale conversion lives in the sale repository and follows the same    │
//! │  rule (−copy, qty − 1, +sale in one transaction).                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use estante_core::{
    BookMetadata, BookSummary, ConservationState, Copy, CopyPatch, DeletedBook, DeletedCopy,
    Money, Reconciliation, ValidationError,
};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{ensure_sebo, from_json, to_json};
use crate::resolver::{self, Resolution};
use crate::retry::RetryPolicy;

// =============================================================================
// Rows
// =============================================================================

/// Raw row from the books table.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct BookRow {
    pub(crate) isbn: String,
    title: String,
    authors: String,
    publisher: Option<String>,
    categories: String,
    published_date: Option<String>,
    description: Option<String>,
    page_count: Option<i64>,
    ratings_count: Option<i64>,
    average_rating: Option<f64>,
    language: Option<String>,
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
    maturity_rating: Option<String>,
    text_snippet: Option<String>,
    total_quantity: i64,
}

/// A stored book without its copies.
#[derive(Debug, Clone, PartialEq)]
pub struct BookRecord {
    pub metadata: BookMetadata,
    pub total_quantity: i64,
}

impl BookRecord {
    /// Attaches copies, producing the API shape.
    pub fn with_copies(self, copies: Vec<Copy>) -> estante_core::Book {
        estante_core::Book {
            metadata: self.metadata,
            total_quantity: self.total_quantity,
            copies,
        }
    }
}

impl TryFrom<BookRow> for BookRecord {
    type Error = DbError;

    fn try_from(row: BookRow) -> DbResult<Self> {
        Ok(BookRecord {
            metadata: BookMetadata {
                isbn: row.isbn,
                title: row.title,
                authors: from_json("authors", &row.authors)?,
                publisher: row.publisher,
                categories: from_json("categories", &row.categories)?,
                published_date: row.published_date,
                description: row.description,
                page_count: row.page_count,
                ratings_count: row.ratings_count,
                average_rating: row.average_rating,
                language: row.language,
                thumbnail: row.thumbnail,
                small_thumbnail: row.small_thumbnail,
                maturity_rating: row.maturity_rating,
                text_snippet: row.text_snippet,
            },
            total_quantity: row.total_quantity,
        })
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    isbn: String,
    title: String,
    authors: String,
    categories: String,
    publisher: Option<String>,
    language: Option<String>,
    thumbnail: Option<String>,
    average_rating: Option<f64>,
    total_quantity: i64,
}

impl TryFrom<SummaryRow> for BookSummary {
    type Error = DbError;

    fn try_from(row: SummaryRow) -> DbResult<Self> {
        Ok(BookSummary {
            isbn: row.isbn,
            title: row.title,
            authors: from_json("authors", &row.authors)?,
            categories: from_json("categories", &row.categories)?,
            publisher: row.publisher,
            language: row.language,
            thumbnail: row.thumbnail,
            average_rating: row.average_rating,
            total_quantity: row.total_quantity,
        })
    }
}

/// Raw row from the copies table.
#[derive(Debug, FromRow)]
pub(crate) struct CopyRow {
    copy_id: String,
    price_cents: i64,
    conservation_state: ConservationState,
    registered_at: DateTime<Utc>,
}

impl From<CopyRow> for Copy {
    fn from(row: CopyRow) -> Self {
        Copy {
            copy_id: row.copy_id,
            price_cents: row.price_cents,
            conservation_state: row.conservation_state,
            registered_at: row.registered_at,
        }
    }
}

/// Result of [`BookRepository::add_copy`].
#[derive(Debug, Clone, PartialEq)]
pub struct AddedCopy {
    /// Key the book is stored under.
    pub isbn: String,
    pub copy: Copy,
    /// True when this call created the book.
    pub created_book: bool,
}

// =============================================================================
// Shared Transaction Steps
// =============================================================================

/// Resolves a book that must exist.
pub(crate) async fn resolve_existing(
    conn: &mut SqliteConnection,
    sebo_id: &str,
    isbn: &str,
) -> DbResult<(String, BookRecord)> {
    let Resolution { key, snapshot } = resolver::resolve(conn, sebo_id, isbn).await?;
    match snapshot {
        Some(record) => Ok((key, record)),
        None => Err(DbError::not_found("Book", isbn)),
    }
}

/// Reads one copy of a resolved book.
pub(crate) async fn load_copy(
    conn: &mut SqliteConnection,
    sebo_id: &str,
    key: &str,
    copy_id: &str,
) -> DbResult<Copy> {
    let row: Option<CopyRow> = sqlx::query_as(
        r#"
        SELECT copy_id, price_cents, conservation_state, registered_at
        FROM copies
        WHERE sebo_id = ?1 AND isbn = ?2 AND copy_id = ?3
        "#,
    )
    .bind(sebo_id)
    .bind(key)
    .bind(copy_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Copy::from)
        .ok_or_else(|| DbError::not_found("Copy", copy_id))
}

/// Removes one copy and decrements the counter.
///
/// The `CHECK (total_quantity >= 0)` constraint aborts the caller's
/// transaction if the counter was already zero.
pub(crate) async fn remove_copy(
    conn: &mut SqliteConnection,
    sebo_id: &str,
    key: &str,
    copy_id: &str,
) -> DbResult<()> {
    let deleted = sqlx::query("DELETE FROM copies WHERE sebo_id = ?1 AND isbn = ?2 AND copy_id = ?3")
        .bind(sebo_id)
        .bind(key)
        .bind(copy_id)
        .execute(&mut *conn)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(DbError::not_found("Copy", copy_id));
    }

    sqlx::query(
        "UPDATE books SET total_quantity = total_quantity - 1 WHERE sebo_id = ?1 AND isbn = ?2",
    )
    .bind(sebo_id)
    .bind(key)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn load_copies(conn: &mut SqliteConnection, sebo_id: &str, key: &str) -> DbResult<Vec<Copy>> {
    let rows: Vec<CopyRow> = sqlx::query_as(
        r#"
        SELECT copy_id, price_cents, conservation_state, registered_at
        FROM copies
        WHERE sebo_id = ?1 AND isbn = ?2
        ORDER BY registered_at, copy_id
        "#,
    )
    .bind(sebo_id)
    .bind(key)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Copy::from).collect())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for book and copy operations.
#[derive(Debug, Clone)]
pub struct BookRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl BookRepository {
    /// Creates a new BookRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        BookRepository { pool, retry }
    }

    /// Gets a book with all its copies, resolving either ISBN form.
    ///
    /// Reads inside one transaction so `total_quantity` and the copy list
    /// come from the same snapshot.
    pub async fn fetch(&self, sebo_id: &str, isbn: &str) -> DbResult<Option<estante_core::Book>> {
        let mut tx = self.pool.begin().await?;

        let resolution = resolver::resolve(&mut tx, sebo_id, isbn).await?;
        let book = match resolution.snapshot {
            Some(record) => {
                let copies = load_copies(&mut tx, sebo_id, &resolution.key).await?;
                Some(record.with_copies(copies))
            }
            None => None,
        };

        tx.commit().await?;
        Ok(book)
    }

    /// Lists every book of a sebo as a reduced projection, by title.
    pub async fn list(&self, sebo_id: &str) -> DbResult<Vec<BookSummary>> {
        debug!(sebo_id = %sebo_id, "Listing books");

        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT isbn, title, authors, categories, publisher, language,
                   thumbnail, average_rating, total_quantity
            FROM books
            WHERE sebo_id = ?1
            ORDER BY title COLLATE NOCASE, isbn
            "#,
        )
        .bind(sebo_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BookSummary::try_from).collect()
    }

    /// Counts the copy rows of a stored key (the ground truth for `total_quantity`).
    pub async fn count_copies(&self, sebo_id: &str, key: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM copies WHERE sebo_id = ?1 AND isbn = ?2")
                .bind(sebo_id)
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Adds one physical copy, creating the book on first sight.
    ///
    /// ## Transaction
    /// 1. Sebo must exist (`NotFound` otherwise)
    /// 2. Resolve the ISBN (13-digit key for new books)
    /// 3. New book: insert with `total_quantity = 1`;
    ///    known book: `total_quantity + 1`
    /// 4. Insert the copy with a fresh UUID
    ///
    /// `metadata` is only used when the book is new.
    pub async fn add_copy(
        &self,
        sebo_id: &str,
        metadata: &BookMetadata,
        price: Money,
        state: ConservationState,
    ) -> DbResult<AddedCopy> {
        let added = self
            .retry
            .run("add_copy", move || {
                self.add_copy_once(sebo_id, metadata, price, state)
            })
            .await?;

        info!(
            sebo_id = %sebo_id,
            isbn = %added.isbn,
            copy_id = %added.copy.copy_id,
            created_book = added.created_book,
            "Copy added"
        );

        Ok(added)
    }

    async fn add_copy_once(
        &self,
        sebo_id: &str,
        metadata: &BookMetadata,
        price: Money,
        state: ConservationState,
    ) -> DbResult<AddedCopy> {
        let mut tx = self.pool.begin().await?;

        ensure_sebo(&mut tx, sebo_id).await?;

        let resolution = resolver::resolve(&mut tx, sebo_id, &metadata.isbn).await?;
        if resolution.key.is_empty() {
            return Err(ValidationError::required("isbn").into());
        }

        let now = Utc::now();
        let created_book = !resolution.exists();

        if created_book {
            // A concurrent first add may commit between our read and this
            // write; the upsert turns that race into an increment.
            sqlx::query(
                r#"
                INSERT INTO books (
                    sebo_id, isbn, title, authors, publisher, categories,
                    published_date, description, page_count, ratings_count,
                    average_rating, language, thumbnail, small_thumbnail,
                    maturity_rating, text_snippet, total_quantity, created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6,
                    ?7, ?8, ?9, ?10,
                    ?11, ?12, ?13, ?14,
                    ?15, ?16, 1, ?17
                )
                ON CONFLICT (sebo_id, isbn)
                DO UPDATE SET total_quantity = total_quantity + 1
                "#,
            )
            .bind(sebo_id)
            .bind(&resolution.key)
            .bind(&metadata.title)
            .bind(to_json("authors", &metadata.authors)?)
            .bind(&metadata.publisher)
            .bind(to_json("categories", &metadata.categories)?)
            .bind(&metadata.published_date)
            .bind(&metadata.description)
            .bind(metadata.page_count)
            .bind(metadata.ratings_count)
            .bind(metadata.average_rating)
            .bind(&metadata.language)
            .bind(&metadata.thumbnail)
            .bind(&metadata.small_thumbnail)
            .bind(&metadata.maturity_rating)
            .bind(&metadata.text_snippet)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "UPDATE books SET total_quantity = total_quantity + 1 WHERE sebo_id = ?1 AND isbn = ?2",
            )
            .bind(sebo_id)
            .bind(&resolution.key)
            .execute(&mut *tx)
            .await?;
        }

        let copy = Copy {
            copy_id: Uuid::new_v4().to_string(),
            price_cents: price.cents(),
            conservation_state: state,
            registered_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO copies (sebo_id, isbn, copy_id, price_cents, conservation_state, registered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(sebo_id)
        .bind(&resolution.key)
        .bind(&copy.copy_id)
        .bind(copy.price_cents)
        .bind(copy.conservation_state)
        .bind(copy.registered_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AddedCopy {
            isbn: resolution.key,
            copy,
            created_book,
        })
    }

    /// Applies a patch to one copy and returns the key and the merged copy.
    ///
    /// The merged record is validated before it is written.
    pub async fn update_copy(
        &self,
        sebo_id: &str,
        isbn: &str,
        copy_id: &str,
        patch: &CopyPatch,
    ) -> DbResult<(String, Copy)> {
        let updated = self
            .retry
            .run("update_copy", move || {
                self.update_copy_once(sebo_id, isbn, copy_id, patch)
            })
            .await?;

        info!(sebo_id = %sebo_id, isbn = %updated.0, copy_id = %copy_id, "Copy updated");
        Ok(updated)
    }

    async fn update_copy_once(
        &self,
        sebo_id: &str,
        isbn: &str,
        copy_id: &str,
        patch: &CopyPatch,
    ) -> DbResult<(String, Copy)> {
        let mut tx = self.pool.begin().await?;

        ensure_sebo(&mut tx, sebo_id).await?;
        let (key, _) = resolve_existing(&mut tx, sebo_id, isbn).await?;
        let current = load_copy(&mut tx, sebo_id, &key, copy_id).await?;
        let merged = patch.apply(&current)?;

        sqlx::query(
            r#"
            UPDATE copies SET price_cents = ?4, conservation_state = ?5
            WHERE sebo_id = ?1 AND isbn = ?2 AND copy_id = ?3
            "#,
        )
        .bind(sebo_id)
        .bind(&key)
        .bind(copy_id)
        .bind(merged.price_cents)
        .bind(merged.conservation_state)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((key, merged))
    }

    /// Deletes one copy and decrements the book's counter.
    pub async fn delete_copy(
        &self,
        sebo_id: &str,
        isbn: &str,
        copy_id: &str,
    ) -> DbResult<DeletedCopy> {
        let deleted = self
            .retry
            .run("delete_copy", move || self.delete_copy_once(sebo_id, isbn, copy_id))
            .await?;

        info!(sebo_id = %sebo_id, isbn = %deleted.isbn, copy_id = %copy_id, "Copy deleted");
        Ok(deleted)
    }

    async fn delete_copy_once(
        &self,
        sebo_id: &str,
        isbn: &str,
        copy_id: &str,
    ) -> DbResult<DeletedCopy> {
        let mut tx = self.pool.begin().await?;

        ensure_sebo(&mut tx, sebo_id).await?;
        let (key, _) = resolve_existing(&mut tx, sebo_id, isbn).await?;
        remove_copy(&mut tx, sebo_id, &key, copy_id).await?;

        tx.commit().await?;
        Ok(DeletedCopy {
            isbn: key,
            copy_id: copy_id.to_string(),
        })
    }

    /// Deletes a book and every copy under it.
    pub async fn delete_book(&self, sebo_id: &str, isbn: &str) -> DbResult<DeletedBook> {
        let deleted = self
            .retry
            .run("delete_book", move || self.delete_book_once(sebo_id, isbn))
            .await?;

        info!(
            sebo_id = %sebo_id,
            isbn = %deleted.isbn,
            copies_removed = deleted.copies_removed,
            "Book deleted"
        );
        Ok(deleted)
    }

    async fn delete_book_once(&self, sebo_id: &str, isbn: &str) -> DbResult<DeletedBook> {
        let mut tx = self.pool.begin().await?;

        ensure_sebo(&mut tx, sebo_id).await?;
        let (key, _) = resolve_existing(&mut tx, sebo_id, isbn).await?;

        let copies = sqlx::query("DELETE FROM copies WHERE sebo_id = ?1 AND isbn = ?2")
            .bind(sebo_id)
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM books WHERE sebo_id = ?1 AND isbn = ?2")
            .bind(sebo_id)
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DeletedBook {
            isbn: key,
            copies_removed: copies.rows_affected() as i64,
        })
    }

    /// Recounts the copies of a book and rewrites `total_quantity`.
    pub async fn reconcile(&self, sebo_id: &str, isbn: &str) -> DbResult<Reconciliation> {
        let result = self
            .retry
            .run("reconcile", move || self.reconcile_once(sebo_id, isbn))
            .await?;

        if result.was_consistent() {
            debug!(sebo_id = %sebo_id, isbn = %result.isbn, "Quantity already consistent");
        } else {
            info!(
                sebo_id = %sebo_id,
                isbn = %result.isbn,
                previous = result.previous,
                recounted = result.recounted,
                "Quantity reconciled"
            );
        }
        Ok(result)
    }

    async fn reconcile_once(&self, sebo_id: &str, isbn: &str) -> DbResult<Reconciliation> {
        let mut tx = self.pool.begin().await?;

        ensure_sebo(&mut tx, sebo_id).await?;
        let (key, record) = resolve_existing(&mut tx, sebo_id, isbn).await?;

        let recounted: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM copies WHERE sebo_id = ?1 AND isbn = ?2")
                .bind(sebo_id)
                .bind(&key)
                .fetch_one(&mut *tx)
                .await?;

        if recounted != record.total_quantity {
            sqlx::query("UPDATE books SET total_quantity = ?3 WHERE sebo_id = ?1 AND isbn = ?2")
                .bind(sebo_id)
                .bind(&key)
                .bind(recounted)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(Reconciliation {
            isbn: key,
            previous: record.total_quantity,
            recounted,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
