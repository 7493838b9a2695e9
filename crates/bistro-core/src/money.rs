//! # Money
//!
//! Monetary values are integer cents everywhere: in the database, in the
//! order totals and on the receipt. Only rendering turns them into text.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product.price_cents ──► OrderDetail.unit_price_cents (frozen copy)    │
//! │                                 │                                       │
//! │                                 ▼ × quantity                            │
//! │                          line_total_cents ──► Σ subtotal                │
//! │                                                   │                     │
//! │                                   tax_rate_bps ───┤                     │
//! │                                                   ▼                     │
//! │                                          tax + subtotal = total         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

/// An amount in the smallest currency unit. Signed so refunds and
/// corrections can be expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

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

    /// Whole currency units, truncated toward zero.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0 / 100
    }

    /// The 0..=99 fractional part.
    #[inline]
    pub const fn fraction(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Tax at `bps` basis points (1000 = 10%), rounded half-up.
    ///
    /// ```rust
    /// use bistro_core::money::Money;
    ///
    /// // 8.25% of 10.00 is 0.825 and rounds to 0.83
    /// assert_eq!(Money::from_cents(1000).calculate_tax(825).cents(), 83);
    /// ```
    pub fn calculate_tax(&self, bps: u32) -> Money {
        // i128 keeps large banquet totals from overflowing
        let cents = (self.0 as i128 * bps as i128 + 5000).div_euclid(10000);
        Money(cents as i64)
    }

    /// Formats with the given symbol, e.g. `€12.50`.
    pub fn format_with(&self, symbol: &str) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}{}.{:02}", sign, symbol, self.units().abs(), self.fraction())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.units().abs(), self.fraction())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(1250).format_with("€"), "€12.50");
        assert_eq!(Money::from_cents(-1).format_with("$"), "-$0.01");
    }

    #[test]
    fn test_tax_rounding() {
        assert_eq!(Money::from_cents(1000).calculate_tax(1000).cents(), 100);
        assert_eq!(Money::from_cents(1000).calculate_tax(825).cents(), 83);
        assert_eq!(Money::from_cents(1).calculate_tax(4999).cents(), 0);
        assert_eq!(Money::zero().calculate_tax(2000).cents(), 0);
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(450);
        let b = Money::from_cents(300);
        assert_eq!((a + b).cents(), 750);
        assert_eq!((a - b).cents(), 150);
        assert_eq!((a * 3).cents(), 1350);

        let total: Money = vec![a, b, Money::from_cents(50)].into_iter().sum();
        assert_eq!(total.cents(), 800);
    }
}
