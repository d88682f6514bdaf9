//! # estante-service: Engines and Request Pipeline for Volta Estante
//!
//! Wires the pure rules of `estante-core` and the store of `estante-db`
//! into the operations a bookstore back office exposes.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transport (HTTP, desktop shell) ── bearer token + JSON body            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 estante-service (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   Estante ──► Pipeline: authenticate → authorize → execute      │   │
//! │  │                                                   → audit       │   │
//! │  │                  │                                              │   │
//! │  │   ┌──────────────┼──────────────┬───────────────┐               │   │
//! │  │   ▼              ▼              ▼               ▼               │   │
//! │  │ Inventory      Sale          Account          Audit             │   │
//! │  │   │  └─► BookListCache ◄─┘      │                               │   │
//! │  │   ▼                             ▼                               │   │
//! │  │ MetadataLookup          IdentityProvider, ClaimsMirror          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  estante-db (SQLite)                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`service`] - The [`Estante`] facade
//! - [`pipeline`] - Request stages and permission policies
//! - [`engine`] - Inventory, Sale, Account and Audit engines
//! - [`collaborators`] - External systems behind async traits
//! - [`cache`] - TTL cache with an injectable clock
//! - [`config`] - Environment configuration
//! - [`error`] - Service error taxonomy
//! - [`telemetry`] - Tracing bootstrap
//!
//! ## Usage
//!
//! ```rust,ignore
//! use estante_service::{telemetry, Estante, ServiceConfig};
//!
//! telemetry::init_tracing();
//! let config = ServiceConfig::load()?;
//! let estante = Estante::with_google_books(&config, identity, claims).await?;
//! let books = estante.fetch_all_books(Some(token)).await?.value;
//! ```

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod telemetry;

pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use config::{ConfigError, ServiceConfig};
pub use engine::{AccountEngine, AuditEngine, BookListCache, InventoryEngine, SaleEngine};
pub use error::{ServiceError, ServiceResult};
pub use pipeline::{Outcome, Pipeline, Policy};
pub use service::{Collaborators, Estante};
