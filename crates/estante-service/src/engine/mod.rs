//! # Engines
//!
//! One engine per aggregate. Engines take their dependencies at
//! construction and hold no global state; the book-list cache is the only
//! value two engines share.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │ InventoryEngine  │     │   SaleEngine     │
//! │ books + copies   │     │ copy → sale      │
//! └────────┬─────────┘     └────────┬─────────┘
//!          │  invalidate            │ invalidate
//!          └──────► BookListCache ◄─┘
//!
//! ┌──────────────────┐     ┌──────────────────┐
//! │  AccountEngine   │     │   AuditEngine    │
//! │ sebos + users    │     │ append-only log  │
//! └──────────────────┘     └──────────────────┘
//! ```

pub mod accounts;
pub mod audit;
pub mod inventory;
pub mod sales;

pub use accounts::AccountEngine;
pub use audit::AuditEngine;
pub use inventory::{BookListCache, InventoryEngine};
pub use sales::SaleEngine;
