//! # Money
//!
//! Prices of copies and sales, held as integer cents.
//!
//! ```text
//! operator input (f64)        store / snapshots / comparisons
//!   39.90  ── from_decimal ──►  Money(3990)
//!   0.005  ── half away ─────►  Money(1)
//! ```
//!
//! Decimal values are converted once at the edge; `0.1 + 0.2` style float
//! drift never reaches a stored price.
//!
//! ## Usage
//! ```rust
//! use estante_core::money::Money;
//!
//! let price = Money::from_decimal(39.90).unwrap();
//! assert_eq!(price.cents(), 3990);
//! assert_eq!(price.to_string(), "39.90");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use ts_rs::TS;

/// A monetary value in cents.
///
/// Currency is not modeled: every tenant prices in its own local currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts a decimal amount to cents.
    ///
    /// Returns `None` for NaN, infinities and values outside the `i64` cent range.
    ///
    /// ## Example
    /// ```rust
    /// use estante_core::money::Money;
    ///
    /// assert_eq!(Money::from_decimal(29.9).map(|m| m.cents()), Some(2990));
    /// assert_eq!(Money::from_decimal(0.005).map(|m| m.cents()), Some(1));
    /// assert_eq!(Money::from_decimal(f64::NAN), None);
    /// ```
    pub fn from_decimal(amount: f64) -> Option<Self> {
        if !amount.is_finite() {
            return None;
        }
        // Scale first, then round, so 0.005 becomes 1 cent rather than 0.
        let cents = (amount * 100.0).round();
        if cents < i64::MIN as f64 || cents > i64::MAX as f64 {
            return None;
        }
        Some(Money(cents as i64))
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the value as a decimal amount (for display and JSON echo only).
    #[inline]
    pub fn to_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

// =============================================================================
// Formatting and Arithmetic
// =============================================================================

/// Plain two-decimal rendering; locale formatting belongs to the frontend.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Revenue totals over sales.
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_decimal_rounds_to_cents() {
        assert_eq!(Money::from_decimal(39.90), Some(Money::from_cents(3990)));
        assert_eq!(Money::from_decimal(49.9), Some(Money::from_cents(4990)));
        assert_eq!(Money::from_decimal(0.1 + 0.2), Some(Money::from_cents(30)));
        // Exact halves round away from zero
        assert_eq!(Money::from_decimal(0.125), Some(Money::from_cents(13)));
        assert_eq!(Money::from_decimal(-0.125), Some(Money::from_cents(-13)));
        assert_eq!(Money::from_decimal(0.0), Some(Money::zero()));
    }

    #[test]
    fn test_from_decimal_rejects_non_finite() {
        assert_eq!(Money::from_decimal(f64::NAN), None);
        assert_eq!(Money::from_decimal(f64::INFINITY), None);
        assert_eq!(Money::from_decimal(f64::NEG_INFINITY), None);
        assert_eq!(Money::from_decimal(1e300), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(3990).to_string(), "39.90");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn test_sum_and_arithmetic() {
        let total: Money = [3990, 2990, 1000]
            .into_iter()
            .map(Money::from_cents)
            .sum();
        assert_eq!(total.cents(), 7980);
        assert_eq!((Money::from_cents(1000) - Money::from_cents(1500)).cents(), -500);
        assert!(Money::from_cents(-1).is_negative());
    }

    #[test]
    fn test_serializes_as_plain_cents() {
        let json = serde_json::to_string(&Money::from_cents(3990)).unwrap();
        assert_eq!(json, "3990");
    }
}
