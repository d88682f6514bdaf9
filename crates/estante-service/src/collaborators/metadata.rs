//! # Metadata Lookup
//!
//! Catalog data for ISBNs the sebo has never stocked.
//!
//! ## Google Books Query
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  input "978-0-14-044913-6"                                              │
//! │     │ sanitize                                                          │
//! │     ▼                                                                   │
//! │  GET …/volumes?q=isbn:9780140449136&printType=books&maxResults=5        │
//! │     │ no items                                                          │
//! │     ▼                                                                   │
//! │  GET …/volumes?q=isbn:0140449132&printType=books&maxResults=5           │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  items[0].volumeInfo → BookMetadata                                     │
//! │                                                                         │
//! │  HTTP and decode errors are logged and reported as "no metadata".      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use estante_core::isbn::{self, IsbnForms};
use estante_core::BookMetadata;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ServiceConfig;

/// Looks up descriptive metadata for an ISBN.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Returns `None` when the catalog has no entry or could not be reached.
    async fn lookup(&self, isbn: &str) -> Option<BookMetadata>;
}

// =============================================================================
// Google Books
// =============================================================================

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    #[serde(default)]
    volume_info: VolumeInfo,
    #[serde(default)]
    search_info: Option<SearchInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    publisher: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    published_date: Option<String>,
    description: Option<String>,
    page_count: Option<i64>,
    ratings_count: Option<i64>,
    average_rating: Option<f64>,
    image_links: Option<ImageLinks>,
    language: Option<String>,
    maturity_rating: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInfo {
    text_snippet: Option<String>,
}

/// Normalizes one volume. Volumes without a title are unusable.
fn normalize_volume(isbn: &str, volume: Volume) -> Option<BookMetadata> {
    let info = volume.volume_info;
    let title = info.title.filter(|t| !t.trim().is_empty())?;
    let (thumbnail, small_thumbnail) = match info.image_links {
        Some(links) => (links.thumbnail, links.small_thumbnail),
        None => (None, None),
    };

    Some(BookMetadata {
        isbn: isbn.to_string(),
        title,
        authors: info.authors,
        publisher: info.publisher,
        categories: info.categories,
        published_date: info.published_date,
        description: info.description,
        page_count: info.page_count,
        ratings_count: info.ratings_count,
        average_rating: info.average_rating,
        language: info.language,
        thumbnail,
        small_thumbnail,
        maturity_rating: info.maturity_rating,
        text_snippet: volume.search_info.and_then(|s| s.text_snippet),
    })
}

/// Google Books volumes API client.
#[derive(Debug, Clone)]
pub struct GoogleBooksClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(GoogleBooksClient {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.google_books_base_url.clone(),
            config.google_books_api_key.clone(),
            config.metadata_timeout,
        )
    }

    async fn query(&self, isbn: &str) -> Result<Option<Volume>, reqwest::Error> {
        let q = format!("isbn:{}", isbn);
        let mut params: Vec<(&str, &str)> =
            vec![("q", q.as_str()), ("printType", "books"), ("maxResults", "5")];
        if let Some(ref key) = self.api_key {
            params.push(("key", key.as_str()));
        }

        let response: VolumesResponse = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.items.into_iter().next())
    }
}

#[async_trait]
impl MetadataLookup for GoogleBooksClient {
    async fn lookup(&self, raw_isbn: &str) -> Option<BookMetadata> {
        let sanitized = isbn::sanitize(raw_isbn);
        if sanitized.is_empty() {
            return None;
        }

        let mut queries = vec![sanitized.clone()];
        if let Some(alt) = isbn::to_isbn10(&sanitized) {
            queries.push(alt);
        }

        for query in &queries {
            match self.query(query).await {
                Ok(Some(volume)) => {
                    debug!(isbn = %query, "Metadata found");
                    return normalize_volume(&sanitized, volume);
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(isbn = %query, error = %e, "Metadata lookup failed");
                    return None;
                }
            }
        }

        debug!(isbn = %sanitized, "No metadata for ISBN");
        None
    }
}

// =============================================================================
// Static catalog
// =============================================================================

/// Fixed in-memory catalog keyed by 13-digit ISBN. Counts lookups.
#[derive(Debug, Default)]
pub struct StaticMetadata {
    books: HashMap<String, BookMetadata>,
    lookups: AtomicUsize,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book(mut self, metadata: BookMetadata) -> Self {
        let key = IsbnForms::from_raw(&metadata.isbn).isbn13;
        self.books.insert(key, metadata);
        self
    }

    /// How many times `lookup` was called.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataLookup for StaticMetadata {
    async fn lookup(&self, isbn: &str) -> Option<BookMetadata> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let key = IsbnForms::from_raw(isbn).isbn13;
        self.books.get(&key).cloned()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
