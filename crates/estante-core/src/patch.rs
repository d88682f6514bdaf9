//! # Typed Partial Updates
//!
//! Every update operation receives an untyped JSON body. Each entity has a
//! patch struct listing the ONLY fields that may change.
//!
//! ## Allow-Lists
//! ```text
//! ┌──────────────────┬─────────────────────────────────────┬───────────────┐
//! │ Patch            │ Mutable fields                      │ Other fields  │
//! ├──────────────────┼─────────────────────────────────────┼───────────────┤
//! │ CopyPatch        │ price, conservationState            │ ignored       │
//! │ SalePatch        │ price, conservationState, userName  │ ignored       │
//! │ UserPatch        │ name, role                          │ ignored       │
//! │ AuditLogPatch    │ action, details                     │ ignored       │
//! └──────────────────┴─────────────────────────────────────┴───────────────┘
//! ```
//!
//! Ignored means silently dropped: `{"price": 10, "copyId": "x"}` updates the
//! price and leaves the id alone. A known field with the wrong type is a
//! validation error. Every `apply` re-validates the merged record.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ValidationError;
use crate::types::{AuditLogEntry, ConservationState, Copy, LogDetails, Role, Sale, User};
use crate::validation::{self, ValidationResult};
use crate::MAX_ACTION_LEN;

fn parse<T: DeserializeOwned>(entity: &str, body: &serde_json::Value) -> ValidationResult<T> {
    T::deserialize(body).map_err(|e| ValidationError::malformed(entity, &e))
}

// =============================================================================
// Copy
// =============================================================================

/// Update of a copy's price or condition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyPatch {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub conservation_state: Option<ConservationState>,
}

impl CopyPatch {
    pub fn from_json(body: &serde_json::Value) -> ValidationResult<Self> {
        parse("copy", body)
    }

    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.conservation_state.is_none()
    }

    /// Returns the merged copy. `copy_id` and `registered_at` never change.
    pub fn apply(&self, current: &Copy) -> ValidationResult<Copy> {
        let mut merged = current.clone();
        if let Some(price) = self.price {
            merged.price_cents = validation::validate_price(price)?.cents();
        }
        if let Some(state) = self.conservation_state {
            merged.conservation_state = state;
        }
        validation::validate_price_cents(merged.price_cents)?;
        Ok(merged)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Administrative correction of a sale record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePatch {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub conservation_state: Option<ConservationState>,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl SalePatch {
    pub fn from_json(body: &serde_json::Value) -> ValidationResult<Self> {
        parse("sale", body)
    }

    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.conservation_state.is_none() && self.user_name.is_none()
    }

    pub fn apply(&self, current: &Sale) -> ValidationResult<Sale> {
        let mut merged = current.clone();
        if let Some(price) = self.price {
            merged.price_cents = validation::validate_price(price)?.cents();
        }
        if let Some(state) = self.conservation_state {
            merged.conservation_state = state;
        }
        if let Some(ref name) = self.user_name {
            validation::validate_name("userName", name)?;
            merged.user_name = name.trim().to_string();
        }
        Ok(merged)
    }
}

// =============================================================================
// User
// =============================================================================

/// Update of an account. Role changes are further gated by
/// [`crate::access::check_role_change`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl UserPatch {
    pub fn from_json(body: &serde_json::Value) -> ValidationResult<Self> {
        parse("user", body)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.role.is_none()
    }

    /// True when the patch actually changes the role.
    pub fn changes_role(&self, current: &User) -> bool {
        matches!(self.role, Some(role) if role != current.role)
    }

    pub fn apply(&self, current: &User) -> ValidationResult<User> {
        let mut merged = current.clone();
        if let Some(ref name) = self.name {
            validation::validate_name("name", name)?;
            merged.name = name.trim().to_string();
        }
        if let Some(role) = self.role {
            merged.role = role;
        }
        Ok(merged)
    }
}

// =============================================================================
// Audit Log
// =============================================================================

/// Administrative correction of an audit entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogPatch {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub details: Option<LogDetails>,
}

impl AuditLogPatch {
    pub fn from_json(body: &serde_json::Value) -> ValidationResult<Self> {
        parse("log", body)
    }

    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.details.is_none()
    }

    pub fn apply(&self, current: &AuditLogEntry) -> ValidationResult<AuditLogEntry> {
        let mut merged = current.clone();
        if let Some(ref action) = self.action {
            let action = action.trim();
            if action.is_empty() {
                return Err(ValidationError::required("action"));
            }
            if action.chars().count() > MAX_ACTION_LEN {
                return Err(ValidationError::TooLong {
                    field: "action".to_string(),
                    max: MAX_ACTION_LEN,
                });
            }
            merged.action = action.to_string();
        }
        if let Some(ref details) = self.details {
            merged.details = details.clone();
        }
        Ok(merged)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn copy() -> Copy {
        Copy {
            copy_id: "c1".to_string(),
            price_cents: 2990,
            conservation_state: ConservationState::Good,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_copy_patch_ignores_unknown_fields() {
        let patch = CopyPatch::from_json(&json!({
            "price": 49.9,
            "copyId": "hijacked",
            "totalQuantity": 99
        }))
        .unwrap();

        let merged = patch.apply(&copy()).unwrap();
        assert_eq!(merged.price_cents, 4990);
        assert_eq!(merged.copy_id, "c1");
        assert_eq!(merged.conservation_state, ConservationState::Good);
    }

    #[test]
    fn test_copy_patch_rejects_bad_values() {
        assert!(CopyPatch::from_json(&json!({ "price": "free" })).is_err());
        assert!(CopyPatch::from_json(&json!({ "conservationState": "torn" })).is_err());

        let negative = CopyPatch::from_json(&json!({ "price": -3 })).unwrap();
        assert!(matches!(
            negative.apply(&copy()),
            Err(ValidationError::Negative { .. })
        ));
    }

    #[test]
    fn test_copy_patch_state_only() {
        let patch = CopyPatch::from_json(&json!({ "conservationState": "Péssimo" })).unwrap();
        let merged = patch.apply(&copy()).unwrap();
        assert_eq!(merged.conservation_state, ConservationState::Poor);
        assert_eq!(merged.price_cents, 2990);
    }

    #[test]
    fn test_empty_patch() {
        let patch = CopyPatch::from_json(&json!({ "isbn": "123" })).unwrap();
        assert!(patch.is_empty());

        let base = copy();
        assert_eq!(patch.apply(&base).unwrap(), base);
    }

    #[test]
    fn test_user_patch_detects_role_change() {
        let user = User {
            user_id: "u1".to_string(),
            name: "Ana".to_string(),
            email: "ana@sebo.com".to_string(),
            sebo_id: "s1".to_string(),
            role: Role::Editor,
            registered_at: Utc::now(),
        };

        let same = UserPatch::from_json(&json!({ "role": "editor", "email": "x@y.z" })).unwrap();
        assert!(!same.changes_role(&user));
        assert_eq!(same.apply(&user).unwrap().email, "ana@sebo.com");

        let promote = UserPatch::from_json(&json!({ "role": "admin" })).unwrap();
        assert!(promote.changes_role(&user));
    }

    #[test]
    fn test_log_patch() {
        let entry = AuditLogEntry {
            log_id: "l1".to_string(),
            user_id: "u1".to_string(),
            user_name: "Ana".to_string(),
            action: "add_copy".to_string(),
            details: LogDetails::new(),
            timestamp: Utc::now(),
        };

        let patch =
            AuditLogPatch::from_json(&json!({ "details": { "note": "typo" }, "userId": "u9" }))
                .unwrap();
        let merged = patch.apply(&entry).unwrap();
        assert_eq!(merged.details["note"], "typo");
        assert_eq!(merged.user_id, "u1");

        let blank = AuditLogPatch::from_json(&json!({ "action": "" })).unwrap();
        assert!(blank.apply(&entry).is_err());
    }
}
