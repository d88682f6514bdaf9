//! # Validation Module
//!
//! Input validation utilities for Volta Estante.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                      │
//! │  ├── Field types, enum labels, required keys                           │
//! │  └── Fails as ValidationError::Malformed                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── ISBN shape, price range, name lengths, email shape                │
//! │  └── Runs before any store access                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (total_quantity >= 0)                                       │
//! │  └── Foreign keys, primary keys                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::isbn;
use crate::money::Money;
use crate::types::{BookMetadata, NewCopy, NewEmployee, NewLogEntry};
use crate::{MAX_ACTION_LEN, MAX_NAME_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an ISBN used as a write key and returns its sanitized form.
///
/// ## Rules
/// - After sanitizing, exactly 10 or 13 characters
/// - 13-digit form: digits only
/// - 10-digit form: 9 digits then a digit or `X`
/// - Check digits are NOT enforced (old stock carries misprinted ones)
///
/// ## Example
/// ```rust
/// use estante_core::validation::validate_isbn;
///
/// assert_eq!(validate_isbn("978-0-14-044913-6").unwrap(), "9780140449136");
/// assert!(validate_isbn("12-34").is_err());
/// ```
pub fn validate_isbn(raw: &str) -> ValidationResult<String> {
    let clean = isbn::sanitize(raw);

    if clean.is_empty() {
        return Err(ValidationError::required("isbn"));
    }

    let well_formed = match clean.len() {
        13 => clean.bytes().all(|b| b.is_ascii_digit()),
        10 => clean[..9].bytes().all(|b| b.is_ascii_digit()),
        _ => false,
    };

    if !well_formed {
        return Err(ValidationError::invalid(
            "isbn",
            "must have 10 or 13 digits ('X' allowed only as the last ISBN-10 character)",
        ));
    }

    Ok(clean)
}

/// Validates a non-empty identifier such as a user or sebo id.
pub fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (titles, user names, sebo names).
pub fn validate_name(field: &str, value: &str) -> ValidationResult<()> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::required(field));
    }

    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Minimal email shape check: one `@`, something on each side, a dot in the domain.
pub fn validate_email(value: &str) -> ValidationResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required("email"));
    }

    match value.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@') =>
        {
            Ok(())
        }
        _ => Err(ValidationError::invalid("email", "not an email address")),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Converts a decimal price into cents.
///
/// ## Rules
/// - Finite (no NaN, no infinity)
/// - Not negative (donated copies may be free)
pub fn validate_price(price: f64) -> ValidationResult<Money> {
    let money = Money::from_decimal(price)
        .ok_or_else(|| ValidationError::invalid("price", "must be a finite number"))?;

    validate_price_cents(money.cents())?;
    Ok(money)
}

/// Validates a stored price in cents.
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: "price".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Entity Validators
// =============================================================================

/// Validates book metadata and returns it with a sanitized ISBN.
///
/// Title is required; everything else in the catalog record is optional.
pub fn validate_metadata(mut metadata: BookMetadata) -> ValidationResult<BookMetadata> {
    metadata.isbn = validate_isbn(&metadata.isbn)?;
    validate_name("title", &metadata.title)?;
    metadata.title = metadata.title.trim().to_string();

    if let Some(pages) = metadata.page_count {
        if pages < 0 {
            return Err(ValidationError::Negative {
                field: "pageCount".to_string(),
            });
        }
    }

    if let Some(rating) = metadata.average_rating {
        if !rating.is_finite() || !(0.0..=5.0).contains(&rating) {
            return Err(ValidationError::invalid("averageRating", "must be between 0 and 5"));
        }
    }

    Ok(metadata)
}

/// Validates a new copy and returns its price in cents.
pub fn validate_new_copy(copy: &NewCopy) -> ValidationResult<Money> {
    validate_price(copy.price)
}

/// Validates an employee provisioning payload.
pub fn validate_new_employee(employee: &NewEmployee) -> ValidationResult<()> {
    validate_name("name", &employee.name)?;
    validate_email(&employee.email)
}

/// Validates an audit entry before it is appended.
pub fn validate_log(entry: &NewLogEntry) -> ValidationResult<()> {
    validate_id("userId", &entry.user_id)?;
    validate_name("userName", &entry.user_name)?;

    let action = entry.action.trim();
    if action.is_empty() {
        return Err(ValidationError::required("action"));
    }
    if action.chars().count() > MAX_ACTION_LEN {
        return Err(ValidationError::TooLong {
            field: "action".to_string(),
            max: MAX_ACTION_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
