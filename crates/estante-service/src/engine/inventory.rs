//! # Inventory Engine
//!
//! Book and copy lifecycle for one sebo at a time.
//!
//! ## Add Copy Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_copy_by_isbn(sebo, isbn, copy)                                     │
//! │     │ validate copy + isbn, sebo must exist                             │
//! │     ▼                                                                   │
//! │  fetch_book ── known ──► stored metadata ──────────────┐                │
//! │     │ unknown                                         │                │
//! │     ▼                                                  │                │
//! │  MetadataLookup ── none ──► NotFound (nothing written)  │                │
//! │     │ some                                             ▼                │
//! │     └────────────────────────────────────────► add_copy(sebo, …)        │
//! │                                                   │ one transaction     │
//! │  add_copy_manual(sebo, metadata, copy) ──────────►│ (estante-db)        │
//! │                                                   ▼                     │
//! │                                     invalidate list cache, re-read book │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use estante_core::validation::{validate_isbn, validate_metadata, validate_new_copy};
use estante_core::{
    Book, BookMetadata, BookSummary, CopyPatch, DeletedBook, DeletedCopy, NewCopy, Reconciliation,
};
use estante_db::Database;
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::collaborators::MetadataLookup;
use crate::error::{ServiceError, ServiceResult};

/// Per-sebo cache of the book list.
pub type BookListCache = TtlCache<String, Vec<BookSummary>>;

/// Owns the Book/Copy lifecycle.
#[derive(Clone)]
pub struct InventoryEngine {
    db: Database,
    metadata: Arc<dyn MetadataLookup>,
    cache: Arc<BookListCache>,
}

impl InventoryEngine {
    pub fn new(db: Database, metadata: Arc<dyn MetadataLookup>, cache: Arc<BookListCache>) -> Self {
        InventoryEngine {
            db,
            metadata,
            cache,
        }
    }

    async fn ensure_sebo(&self, sebo_id: &str) -> ServiceResult<()> {
        if self.db.sebos().exists(sebo_id).await? {
            Ok(())
        } else {
            Err(ServiceError::not_found("Sebo", sebo_id))
        }
    }

    async fn read_book(&self, sebo_id: &str, isbn: &str) -> ServiceResult<Book> {
        self.db
            .books()
            .fetch(sebo_id, isbn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Book", isbn))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Adds one copy of `isbn`, creating the book from `metadata` if needed.
    ///
    /// Returns the book with all its copies, read after the commit.
    pub async fn add_copy(
        &self,
        sebo_id: &str,
        isbn: &str,
        mut metadata: BookMetadata,
        copy: &NewCopy,
    ) -> ServiceResult<Book> {
        let price = validate_new_copy(copy)?;
        metadata.isbn = isbn.to_string();
        let metadata = validate_metadata(metadata)?;

        let added = self
            .db
            .books()
            .add_copy(sebo_id, &metadata, price, copy.conservation_state)
            .await?;
        self.cache.invalidate(&sebo_id.to_string()).await;

        self.read_book(sebo_id, &added.isbn).await
    }

    /// Adds a copy by ISBN, asking the catalog only for unknown books.
    pub async fn add_copy_by_isbn(
        &self,
        sebo_id: &str,
        isbn: &str,
        copy: &NewCopy,
    ) -> ServiceResult<Book> {
        validate_new_copy(copy)?;
        let isbn = validate_isbn(isbn)?;
        self.ensure_sebo(sebo_id).await?;

        let metadata = match self.db.books().fetch(sebo_id, &isbn).await? {
            Some(book) => {
                debug!(sebo_id = %sebo_id, isbn = %isbn, "Known book, skipping metadata lookup");
                book.metadata
            }
            None => self
                .metadata
                .lookup(&isbn)
                .await
                .ok_or_else(|| ServiceError::not_found("Book metadata", &isbn))?,
        };

        self.add_copy(sebo_id, &isbn, metadata, copy).await
    }

    /// Adds a copy with operator-supplied metadata.
    pub async fn add_copy_manual(
        &self,
        sebo_id: &str,
        metadata: BookMetadata,
        copy: &NewCopy,
    ) -> ServiceResult<Book> {
        let isbn = metadata.isbn.clone();
        self.add_copy(sebo_id, &isbn, metadata, copy).await
    }

    /// Changes price and/or condition of one copy.
    pub async fn update_copy(
        &self,
        sebo_id: &str,
        isbn: &str,
        copy_id: &str,
        patch: &CopyPatch,
    ) -> ServiceResult<Book> {
        self.ensure_sebo(sebo_id).await?;
        let (key, _) = self
            .db
            .books()
            .update_copy(sebo_id, isbn, copy_id, patch)
            .await?;
        self.cache.invalidate(&sebo_id.to_string()).await;

        self.read_book(sebo_id, &key).await
    }

    pub async fn delete_copy(
        &self,
        sebo_id: &str,
        isbn: &str,
        copy_id: &str,
    ) -> ServiceResult<DeletedCopy> {
        self.ensure_sebo(sebo_id).await?;
        let deleted = self.db.books().delete_copy(sebo_id, isbn, copy_id).await?;
        self.cache.invalidate(&sebo_id.to_string()).await;
        Ok(deleted)
    }

    /// Deletes a book and every copy under it.
    pub async fn delete_book(&self, sebo_id: &str, isbn: &str) -> ServiceResult<DeletedBook> {
        self.ensure_sebo(sebo_id).await?;
        let deleted = self.db.books().delete_book(sebo_id, isbn).await?;
        self.cache.invalidate(&sebo_id.to_string()).await;
        Ok(deleted)
    }

    /// Recounts copies and repairs `total_quantity`.
    pub async fn reconcile_book(&self, sebo_id: &str, isbn: &str) -> ServiceResult<Reconciliation> {
        self.ensure_sebo(sebo_id).await?;
        let result = self.db.books().reconcile(sebo_id, isbn).await?;
        if !result.was_consistent() {
            self.cache.invalidate(&sebo_id.to_string()).await;
        }
        Ok(result)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn fetch_book(&self, sebo_id: &str, isbn: &str) -> ServiceResult<Book> {
        self.ensure_sebo(sebo_id).await?;
        self.read_book(sebo_id, isbn).await
    }

    /// Book list of a sebo, served from the cache while fresh.
    pub async fn fetch_all_books(&self, sebo_id: &str) -> ServiceResult<Arc<Vec<BookSummary>>> {
        let key = sebo_id.to_string();
        if let Some(books) = self.cache.get(&key).await {
            debug!(sebo_id = %sebo_id, "Book list cache hit");
            return Ok(books);
        }

        self.ensure_sebo(sebo_id).await?;
        let books = self.db.books().list(sebo_id).await?;
        info!(sebo_id = %sebo_id, count = books.len(), "Book list loaded");

        Ok(self.cache.insert(key, books).await)
    }
}

impl std::fmt::Debug for InventoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::collaborators::StaticMetadata;
    use chrono::Utc;
    use estante_core::{ConservationState, Sebo};
    use estante_db::DbConfig;
    use std::time::Duration;

    struct Fixture {
        engine: InventoryEngine,
        catalog: Arc<StaticMetadata>,
        clock: Arc<ManualClock>,
        db: Database,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.sebos()
            .insert(&Sebo {
                sebo_id: "s1".to_string(),
                owner_user_id: "u1".to_string(),
                display_name: "Sebo do Centro".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let catalog = Arc::new(StaticMetadata::new().with_book(BookMetadata {
            isbn: "9780140449136".to_string(),
            title: "Crime and Punishment".to_string(),
            authors: vec!["Fyodor Dostoyevsky".to_string()],
            ..Default::default()
        }));
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(BookListCache::with_clock(Duration::from_secs(30), clock.clone()));

        Fixture {
            engine: InventoryEngine::new(db.clone(), catalog.clone(), cache),
            catalog,
            clock,
            db,
        }
    }

    fn copy(price: f64) -> NewCopy {
        NewCopy {
            price,
            conservation_state: ConservationState::Good,
        }
    }

    #[tokio::test]
    async fn test_lookup_only_for_unknown_books() {
        let f = fixture().await;

        f.engine.add_copy_by_isbn("s1", "9780140449136", &copy(39.9)).await.unwrap();
        let book = f.engine.add_copy_by_isbn("s1", "0140449132", &copy(29.9)).await.unwrap();

        assert_eq!(f.catalog.lookups(), 1);
        assert_eq!(book.total_quantity, 2);
        assert_eq!(book.copies.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_metadata_writes_nothing() {
        let f = fixture().await;

        let result = f.engine.add_copy_by_isbn("s1", "9791034300304", &copy(10.0)).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert!(f.db.books().list("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_copy_rejected_before_lookup() {
        let f = fixture().await;

        let result = f.engine.add_copy_by_isbn("s1", "9780140449136", &copy(-1.0)).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert_eq!(f.catalog.lookups(), 0);
    }

    #[tokio::test]
    async fn test_missing_sebo() {
        let f = fixture().await;

        let result = f.engine.add_copy_by_isbn("nope", "9780140449136", &copy(10.0)).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert!(matches!(
            f.engine.fetch_book("nope", "9780140449136").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_add_requires_title() {
        let f = fixture().await;
        let metadata = BookMetadata {
            isbn: "9788535914849".to_string(),
            ..Default::default()
        };

        let result = f.engine.add_copy_manual("s1", metadata, &copy(24.9)).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_cache_invalidated_by_writes() {
        let f = fixture().await;

        assert!(f.engine.fetch_all_books("s1").await.unwrap().is_empty());

        let book = f.engine.add_copy_by_isbn("s1", "9780140449136", &copy(39.9)).await.unwrap();
        let listed = f.engine.fetch_all_books("s1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].total_quantity, 1);

        let copy_id = book.copies[0].copy_id.clone();
        f.engine.delete_copy("s1", "9780140449136", &copy_id).await.unwrap();
        assert_eq!(f.engine.fetch_all_books("s1").await.unwrap()[0].total_quantity, 0);
    }

    #[tokio::test]
    async fn test_list_cache_serves_stale_until_ttl() {
        let f = fixture().await;
        assert!(f.engine.fetch_all_books("s1").await.unwrap().is_empty());

        // A write that bypasses the engine is invisible until the entry expires.
        f.db
            .books()
            .add_copy(
                "s1",
                &BookMetadata {
                    isbn: "9780141439518".to_string(),
                    title: "Pride and Prejudice".to_string(),
                    ..Default::default()
                },
                estante_core::Money::from_cents(2990),
                ConservationState::New,
            )
            .await
            .unwrap();
        assert!(f.engine.fetch_all_books("s1").await.unwrap().is_empty());

        f.clock.advance(Duration::from_secs(31));
        assert_eq!(f.engine.fetch_all_books("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_book_then_fetch() {
        let f = fixture().await;
        f.engine.add_copy_by_isbn("s1", "9780140449136", &copy(39.9)).await.unwrap();

        let deleted = f.engine.delete_book("s1", "0140449132").await.unwrap();
        assert_eq!(deleted.isbn, "9780140449136");
        assert!(matches!(
            f.engine.fetch_book("s1", "9780140449136").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
