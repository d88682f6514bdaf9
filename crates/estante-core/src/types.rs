//! # Domain Types
//!
//! Core domain types used throughout Volta Estante.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Sebo (tenant) ──┬── User ×N         (role: admin | editor | reader)    │
//! │                  │                                                      │
//! │                  ├── Book ×N         (key: isbn, 13-digit preferred)    │
//! │                  │    └── Copy ×N    (one per physical unit)            │
//! │                  │                                                      │
//! │                  ├── Sale ×N         (immutable Book+Copy snapshot)     │
//! │                  │                                                      │
//! │                  └── AuditLogEntry ×N                                   │
//! │                                                                         │
//! │  Book.total_quantity == count(Copy) after every committed operation    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All types serialize with camelCase keys, the shape the web frontend reads.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Role
// =============================================================================

/// Staff role inside a sebo.
///
/// ## Capabilities
/// ```text
/// Admin   ─ everything, including employees, logs and sale corrections
/// Editor  ─ inventory writes and sales
/// Reader  ─ inventory reads
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Reader,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Editor, Role::Reader];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Reader => "reader",
        }
    }
}

impl Default for Role {
    /// Baseline role for accounts that did not create their sebo.
    fn default() -> Self {
        Role::Reader
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "reader" => Ok(Role::Reader),
            _ => Err(ValidationError::NotAllowed {
                field: "role".to_string(),
                allowed: Role::ALL.iter().map(|r| r.as_str().to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Conservation State
// =============================================================================

/// Physical condition of a copy.
///
/// Also accepts the Portuguese labels printed on shelf tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ConservationState {
    #[default]
    #[serde(alias = "Novo", alias = "New")]
    New,
    #[serde(alias = "Bom", alias = "Good")]
    Good,
    #[serde(alias = "Mediano", alias = "Fair")]
    Fair,
    #[serde(alias = "Péssimo", alias = "Poor")]
    Poor,
}

impl ConservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConservationState::New => "new",
            ConservationState::Good => "good",
            ConservationState::Fair => "fair",
            ConservationState::Poor => "poor",
        }
    }
}

// =============================================================================
// Sebo (Tenant)
// =============================================================================

/// A bookstore account. Every other record lives under one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Sebo {
    pub sebo_id: String,

    /// The user whose registration created this sebo.
    pub owner_user_id: String,

    pub display_name: String,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// User
// =============================================================================

/// A staff account. `user_id` is issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub sebo_id: String,
    pub role: Role,

    #[ts(as = "String")]
    pub registered_at: DateTime<Utc>,
}

/// Self-registration payload.
///
/// ## Tenant Selection
/// - `sebo_id` of an existing sebo: join it as a Reader
/// - unknown or missing `sebo_id`: create a sebo named `sebo_name`, become its Admin
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default)]
    pub sebo_id: Option<String>,

    #[serde(default)]
    pub sebo_name: Option<String>,

    /// Ignored when joining; new sebos always start with an Admin.
    #[serde(default)]
    pub role: Option<Role>,
}

/// Payload an Admin sends to provision an employee account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewEmployee {
    pub name: String,
    pub email: String,

    #[serde(default = "default_employee_role")]
    pub role: Role,
}

fn default_employee_role() -> Role {
    Role::Editor
}

/// Result of employee provisioning.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedEmployee {
    pub user: User,

    /// Shown once to the Admin; never stored.
    pub temporary_password: String,

    pub password_reset_link: Option<String>,
}

/// Result of a user deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeletionInfo {
    pub user_id: String,
    pub email: String,

    /// Editor promoted to Admin when an Admin deleted themself.
    pub promoted_user_id: Option<String>,
}

// =============================================================================
// Principal
// =============================================================================

/// The verified caller of a request.
///
/// `sebo_id` and `role` come from the claims mirror and are absent until
/// the account is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub sebo_id: Option<String>,
    pub role: Option<Role>,
}

impl Principal {
    /// Tenant and role, when both claims are present.
    pub fn membership(&self) -> Option<(&str, Role)> {
        match (&self.sebo_id, self.role) {
            (Some(sebo), Some(role)) => Some((sebo.as_str(), role)),
            _ => None,
        }
    }
}

// =============================================================================
// Book
// =============================================================================

/// Descriptive metadata of a title, as returned by the catalog lookup or
/// typed in by an operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub page_count: Option<i64>,
    #[serde(default)]
    pub ratings_count: Option<i64>,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub small_thumbnail: Option<String>,
    #[serde(default)]
    pub maturity_rating: Option<String>,
    #[serde(default)]
    pub text_snippet: Option<String>,
}

/// A title in a sebo's inventory with all of its copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(flatten)]
    pub metadata: BookMetadata,

    /// Cached count of `copies`.
    pub total_quantity: i64,

    pub copies: Vec<Copy>,
}

impl Book {
    pub fn isbn(&self) -> &str {
        &self.metadata.isbn
    }

    /// Finds a copy by id.
    pub fn copy(&self, copy_id: &str) -> Option<&Copy> {
        self.copies.iter().find(|c| c.copy_id == copy_id)
    }
}

/// Reduced projection used by the inventory list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub isbn: String,
    pub title: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub thumbnail: Option<String>,
    pub average_rating: Option<f64>,
    pub total_quantity: i64,
}

/// Result of a book deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeletedBook {
    pub isbn: String,
    pub copies_removed: i64,
}

/// Result of a copy deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCopy {
    pub isbn: String,
    pub copy_id: String,
}

/// Result of a quantity recount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub isbn: String,
    pub previous: i64,
    pub recounted: i64,
}

impl Reconciliation {
    pub fn was_consistent(&self) -> bool {
        self.previous == self.recounted
    }
}

// =============================================================================
// Copy
// =============================================================================

/// One physical unit of a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Copy {
    pub copy_id: String,
    pub price_cents: i64,
    pub conservation_state: ConservationState,

    #[ts(as = "String")]
    pub registered_at: DateTime<Utc>,
}

impl Copy {
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// Input shape for a new copy. `price` is a decimal amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewCopy {
    pub price: f64,

    #[serde(default)]
    pub conservation_state: ConservationState,
}

impl NewCopy {
    /// Parses an untyped request body.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValidationError> {
        NewCopy::deserialize(value).map_err(|e| ValidationError::malformed("copy", &e))
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Snapshot of a Book and one of its Copies at the moment of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub sale_id: String,

    /// Staff member who registered the sale.
    pub user_id: String,
    pub user_name: String,

    pub isbn: String,
    pub book_title: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub average_rating: Option<f64>,

    pub price_cents: i64,
    pub conservation_state: ConservationState,

    #[ts(as = "String")]
    pub sale_date: DateTime<Utc>,
}

impl Sale {
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Audit Log
// =============================================================================

/// Free-form key-value details attached to an audit entry.
pub type LogDetails = BTreeMap<String, serde_json::Value>;

/// One administrative action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub log_id: String,
    pub user_id: String,
    pub user_name: String,
    pub action: String,
    pub details: LogDetails,

    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

/// An entry before id and timestamp are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewLogEntry {
    pub user_id: String,
    pub user_name: String,
    pub action: String,
    #[serde(default)]
    pub details: LogDetails,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_parsing() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("editor".parse::<Role>(), Ok(Role::Editor));
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Reader);
    }

    #[test]
    fn test_conservation_state_accepts_shelf_labels() {
        let state: ConservationState = serde_json::from_value(json!("Mediano")).unwrap();
        assert_eq!(state, ConservationState::Fair);
        let state: ConservationState = serde_json::from_value(json!("poor")).unwrap();
        assert_eq!(state, ConservationState::Poor);
        assert!(serde_json::from_value::<ConservationState>(json!("rasgado")).is_err());
    }

    #[test]
    fn test_new_copy_defaults_to_new_condition() {
        let copy = NewCopy::from_json(&json!({ "price": 39.9 })).unwrap();
        assert_eq!(copy.conservation_state, ConservationState::New);
    }

    #[test]
    fn test_new_copy_requires_numeric_price() {
        assert!(matches!(
            NewCopy::from_json(&json!({ "conservationState": "good" })),
            Err(ValidationError::Malformed { .. })
        ));
        assert!(NewCopy::from_json(&json!({ "price": "cheap" })).is_err());
    }

    #[test]
    fn test_book_serializes_flat() {
        let book = Book {
            metadata: BookMetadata {
                isbn: "9780140449136".to_string(),
                title: "Crime and Punishment".to_string(),
                ..Default::default()
            },
            total_quantity: 0,
            copies: vec![],
        };
        let value = serde_json::to_value(&book).unwrap();
        assert_eq!(value["isbn"], "9780140449136");
        assert_eq!(value["totalQuantity"], 0);
    }

    #[test]
    fn test_principal_membership() {
        let mut principal = Principal {
            user_id: "u1".to_string(),
            email: "ana@example.com".to_string(),
            name: "Ana".to_string(),
            sebo_id: None,
            role: None,
        };
        assert_eq!(principal.membership(), None);
        principal.sebo_id = Some("s1".to_string());
        principal.role = Some(Role::Editor);
        assert_eq!(principal.membership(), Some(("s1", Role::Editor)));
    }
}
