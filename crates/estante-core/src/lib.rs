//! # estante-core: Pure Domain Logic for Volta Estante
//!
//! This crate is the **heart** of Volta Estante. It contains the domain model
//! and every rule that can be decided without touching storage.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Volta Estante Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   estante-service (Engines)                     │   │
//! │  │   Inventory ─ Sales ─ Accounts ─ Audit ─ Request pipeline       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ estante-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   isbn    │  │   patch   │  │ validation│  │   │
//! │  │   │   Book    │  │ 10 ⇄ 13   │  │ CopyPatch │  │   rules   │  │   │
//! │  │   │   Copy    │  │ checksums │  │ UserPatch │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │   ┌───────────┐  ┌───────────┐                                │   │
//! │  │   │   money   │  │  access   │                                │   │
//! │  │   │   cents   │  │ deletion  │                                │   │
//! │  │   └───────────┘  └───────────┘                                │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  estante-db (Database Layer)                    │   │
//! │  │        SQLite document store, transactions, identity resolver    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Book, Copy, Sale, User, Sebo, AuditLogEntry)
//! - [`isbn`] - ISBN-10 / ISBN-13 normalization and checksums
//! - [`money`] - Integer-cent money type
//! - [`patch`] - Typed partial updates with per-entity allow-lists
//! - [`access`] - Account business rules (deletion matrix, role changes)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use estante_core::isbn;
//!
//! let isbn13 = isbn::to_isbn13(&isbn::sanitize("0-14-044913-2"));
//! assert_eq!(isbn13, "9780140449136");
//! assert_eq!(isbn::to_isbn10(&isbn13).as_deref(), Some("0140449132"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod error;
pub mod isbn;
pub mod money;
pub mod patch;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use patch::{AuditLogPatch, CopyPatch, SalePatch, UserPatch};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of free-text names (titles, display names, user names).
pub const MAX_NAME_LEN: usize = 300;

/// Maximum length of an audit action label.
pub const MAX_ACTION_LEN: usize = 100;
