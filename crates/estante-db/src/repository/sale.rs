//! # Sale Repository
//!
//! Sales are snapshots: once written they no longer reference the copy
//! they came from.
//!
//! ## Copy → Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  create_from_copy (ONE transaction)                     │
//! │                                                                         │
//! │  1. resolve ISBN            → NotFound(Book) if absent                  │
//! │  2. read copy               → NotFound(Copy) if absent                  │
//! │  3. INSERT sale             (title, authors, categories, rating,       │
//! │                              price, state copied from book + copy)     │
//! │  4. DELETE copy                                                        │
//! │  5. total_quantity - 1                                                 │
//! │                                                                         │
//! │  Any failure rolls back all three writes.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use estante_core::{ConservationState, Sale, SalePatch};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::book::{load_copy, remove_copy, resolve_existing};
use crate::repository::{ensure_sebo, from_json, to_json};
use crate::retry::RetryPolicy;

#[derive(Debug, FromRow)]
struct SaleRow {
    sale_id: String,
    user_id: String,
    user_name: String,
    isbn: String,
    book_title: String,
    authors: String,
    categories: String,
    average_rating: Option<f64>,
    price_cents: i64,
    conservation_state: ConservationState,
    sale_date: DateTime<Utc>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = DbError;

    fn try_from(row: SaleRow) -> DbResult<Self> {
        Ok(Sale {
            sale_id: row.sale_id,
            user_id: row.user_id,
            user_name: row.user_name,
            isbn: row.isbn,
            book_title: row.book_title,
            authors: from_json("authors", &row.authors)?,
            categories: from_json("categories", &row.categories)?,
            average_rating: row.average_rating,
            price_cents: row.price_cents,
            conservation_state: row.conservation_state,
            sale_date: row.sale_date,
        })
    }
}

const SALE_COLUMNS: &str = "sale_id, user_id, user_name, isbn, book_title, authors, categories, \
                            average_rating, price_cents, conservation_state, sale_date";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        SaleRepository { pool, retry }
    }

    /// Converts one copy into a sale.
    pub async fn create_from_copy(
        &self,
        sebo_id: &str,
        isbn: &str,
        copy_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> DbResult<Sale> {
        let sale = self
            .retry
            .run("create_sale", move || {
                self.create_from_copy_once(sebo_id, isbn, copy_id, user_id, user_name)
            })
            .await?;

        info!(
            sebo_id = %sebo_id,
            sale_id = %sale.sale_id,
            isbn = %sale.isbn,
            copy_id = %copy_id,
            price = %sale.price(),
            "Sale recorded"
        );
        Ok(sale)
    }

    async fn create_from_copy_once(
        &self,
        sebo_id: &str,
        isbn: &str,
        copy_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        ensure_sebo(&mut tx, sebo_id).await?;
        let (key, book) = resolve_existing(&mut tx, sebo_id, isbn).await?;
        let copy = load_copy(&mut tx, sebo_id, &key, copy_id).await?;

        let sale = Sale {
            sale_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            isbn: key.clone(),
            book_title: book.metadata.title,
            authors: book.metadata.authors,
            categories: book.metadata.categories,
            average_rating: book.metadata.average_rating,
            price_cents: copy.price_cents,
            conservation_state: copy.conservation_state,
            sale_date: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO sales (
                sebo_id, sale_id, user_id, user_name, isbn, book_title, authors,
                categories, average_rating, price_cents, conservation_state, sale_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(sebo_id)
        .bind(&sale.sale_id)
        .bind(&sale.user_id)
        .bind(&sale.user_name)
        .bind(&sale.isbn)
        .bind(&sale.book_title)
        .bind(to_json("authors", &sale.authors)?)
        .bind(to_json("categories", &sale.categories)?)
        .bind(sale.average_rating)
        .bind(sale.price_cents)
        .bind(sale.conservation_state)
        .bind(sale.sale_date)
        .execute(&mut *tx)
        .await?;

        remove_copy(&mut tx, sebo_id, &key, copy_id).await?;

        tx.commit().await?;
        Ok(sale)
    }

    /// Gets one sale.
    pub async fn get(&self, sebo_id: &str, sale_id: &str) -> DbResult<Option<Sale>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE sebo_id = ?1 AND sale_id = ?2",
            SALE_COLUMNS
        );
        let row: Option<SaleRow> = sqlx::query_as(&sql)
            .bind(sebo_id)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Sale::try_from).transpose()
    }

    /// Lists the sales of a sebo, newest first.
    pub async fn list(&self, sebo_id: &str) -> DbResult<Vec<Sale>> {
        debug!(sebo_id = %sebo_id, "Listing sales");

        let sql = format!(
            "SELECT {} FROM sales WHERE sebo_id = ?1 ORDER BY sale_date DESC, rowid DESC",
            SALE_COLUMNS
        );
        let rows: Vec<SaleRow> = sqlx::query_as(&sql)
            .bind(sebo_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Sale::try_from).collect()
    }

    /// Applies an administrative correction to a sale.
    pub async fn update(&self, sebo_id: &str, sale_id: &str, patch: &SalePatch) -> DbResult<Sale> {
        let sale = self
            .retry
            .run("update_sale", move || self.update_once(sebo_id, sale_id, patch))
            .await?;

        info!(sebo_id = %sebo_id, sale_id = %sale_id, "Sale updated");
        Ok(sale)
    }

    async fn update_once(&self, sebo_id: &str, sale_id: &str, patch: &SalePatch) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM sales WHERE sebo_id = ?1 AND sale_id = ?2",
            SALE_COLUMNS
        );
        let row: Option<SaleRow> = sqlx::query_as(&sql)
            .bind(sebo_id)
            .bind(sale_id)
            .fetch_optional(&mut *tx)
            .await?;

        let current = match row {
            Some(row) => Sale::try_from(row)?,
            None => return Err(DbError::not_found("Sale", sale_id)),
        };
        let merged = patch.apply(&current)?;

        sqlx::query(
            r#"
            UPDATE sales SET price_cents = ?3, conservation_state = ?4, user_name = ?5
            WHERE sebo_id = ?1 AND sale_id = ?2
            "#,
        )
        .bind(sebo_id)
        .bind(sale_id)
        .bind(merged.price_cents)
        .bind(merged.conservation_state)
        .bind(&merged.user_name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(merged)
    }

    /// Deletes a sale record. Does not restore the copy.
    pub async fn delete(&self, sebo_id: &str, sale_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM sales WHERE sebo_id = ?1 AND sale_id = ?2")
            .bind(sebo_id)
            .bind(sale_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        info!(sebo_id = %sebo_id, sale_id = %sale_id, "Sale deleted");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
