//! # Money Module
//!
//! Integer money for receipt thresholds.
//!
//! The receipt engine never does tax math. It only compares transaction
//! totals against country thresholds ("invoice mandatory above 700 PEN",
//! "VAT number required from 1000 EUR"), so `Money` here is a thin,
//! ordered wrapper over minor units.
//!
//! ## Threshold Comparison
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total = -750.00 (a return)        threshold = 700.00                   │
//! │                                                                         │
//! │  |total| = 750.00  ──► Inclusive (≥): met     Exclusive (>): met        │
//! │                                                                         │
//! │  total = 700.00                                                         │
//! │  |total| = 700.00  ──► Inclusive (≥): met     Exclusive (>): NOT met    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use titan_receipt::money::Money;
//!
//! let total = Money::from_major_minor(-750, 0);
//! assert_eq!(total.abs(), Money::from_cents(75_000));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use ts_rs::TS;

/// A monetary value in the smallest unit of the accounting currency.
///
/// Signed: returns and post-voids carry negative totals.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a value from minor units (cents, céntimos, ...).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Absolute value. Thresholds are always checked against `|total|`.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.saturating_abs())
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Money {
    /// Formats as `major.minor` without currency symbol (locale formatting
    /// belongs to the presentation layer).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_minor_negative() {
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    }

    #[test]
    fn test_abs_of_return_total() {
        let total = Money::from_cents(-75_000);
        assert_eq!(total.abs().cents(), 75_000);
        assert!(total.is_negative());
        assert!(!total.abs().is_negative());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(70_000).to_string(), "700.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn test_ordering_for_thresholds() {
        let threshold = Money::from_major_minor(700, 0);
        assert!(Money::from_cents(70_000) >= threshold);
        assert!(Money::from_cents(69_999) < threshold);
        assert_eq!(threshold - Money::from_cents(100), Money::from_cents(69_900));
    }
}
