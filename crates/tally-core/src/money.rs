//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                             │
//! │                                                                         │
//! │  A cart that shows $10.83 on the terminal and $10.82 on the customer   │
//! │  display is a support ticket. Both screens must agree to the cent.     │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every line total, subtotal, tax and change is an i64 of cents.      │
//! │    Rounding happens in exactly one place per operation.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::quantity::Quantity;
//!
//! let price = Money::from_cents(1099); // $10.99
//!
//! let doubled = price * 2;                           // $21.98
//! let per_kg = Money::from_cents(450);               // $4.50 / kg
//! let line = per_kg.times(Quantity::from_milli(1250)); // 1.250 kg
//! assert_eq!(line.cents(), 563);                     // $5.625 → $5.63
//! assert_eq!(doubled.cents(), 2198);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::quantity::{Quantity, MILLI_PER_UNIT};
use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds and corrections
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Money Flows
/// ```text
/// Product.price_cents ──► LineItem.unit_price ──► LineItem.total_price
///                                                      │
///                          CalculationResult.subtotal ◄┘
///                                │
///                                ├──► tax ──► total ──► change
///                                │
///                                └──► DisplayEvent snapshot (customer screen)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units (dollars and cents).
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Parses a decimal amount typed on the numpad ("12", "12.5", "12.05").
    ///
    /// Returns `None` for anything that is not a plain non-negative decimal
    /// with at most two fraction digits.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("20").unwrap().cents(), 2000);
    /// assert_eq!(Money::parse_decimal("7.5").unwrap().cents(), 750);
    /// assert!(Money::parse_decimal("1.234").is_none());
    /// assert!(Money::parse_decimal("abc").is_none());
    /// ```
    pub fn parse_decimal(input: &str) -> Option<Self> {
        let (whole, fraction) = split_decimal(input.trim(), 2)?;
        let cents = whole.checked_mul(100)?.checked_add(fraction)?;
        Some(Money(cents))
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (cents) portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Calculates tax on this amount, rounding half up to the cent.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::TaxRate;
    ///
    /// let price = Money::from_cents(1000);     // $10.00
    /// let tax = price.calculate_tax(TaxRate::from_bps(825)); // 8.25%
    /// assert_eq!(tax.cents(), 83);             // $0.825 → $0.83
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax_cents = round_div(self.0 as i128 * rate.bps() as i128, 10_000);
        Money::from_cents(tax_cents as i64)
    }

    /// Multiplies money by a whole-unit count.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Multiplies a unit price by a measured quantity (milli-units), rounding
    /// half up to the cent.
    ///
    /// Whole-unit quantities are exact: `times(Quantity::units(3)) == self * 3`.
    pub fn times(&self, quantity: Quantity) -> Money {
        let cents = round_div(self.0 as i128 * quantity.milli() as i128, MILLI_PER_UNIT as i128);
        Money(cents as i64)
    }

    /// Cash change owed for `received` against `self` as the amount due.
    ///
    /// Fails closed: returns `None` when the customer handed over less than
    /// the amount due, so a negative change can never be reported.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let total = Money::from_cents(1083);
    /// assert_eq!(total.change_from(Money::from_cents(2000)), Some(Money::from_cents(917)));
    /// assert_eq!(total.change_from(Money::from_cents(1000)), None);
    /// ```
    pub fn change_from(&self, received: Money) -> Option<Money> {
        if received < *self {
            None
        } else {
            Some(received - *self)
        }
    }
}

/// Integer division rounding half away from zero.
pub(crate) fn round_div(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

/// Splits "12.34" into (12, 34) scaled to `scale` fraction digits.
///
/// "12.3" with scale 2 becomes (12, 30). Rejects signs, empty input, more
/// than `scale` fraction digits and non-digit characters.
pub(crate) fn split_decimal(input: &str, scale: u32) -> Option<(i64, i64)> {
    if input.is_empty() {
        return None;
    }

    let (whole_str, fraction_str) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };

    if whole_str.is_empty() && fraction_str.is_empty() {
        return None;
    }
    if fraction_str.len() > scale as usize {
        return None;
    }
    if !whole_str.chars().all(|c| c.is_ascii_digit()) || !fraction_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if whole_str.is_empty() { 0 } else { whole_str.parse().ok()? };
    let padded = format!("{:0<width$}", fraction_str, width = scale as usize);
    let fraction: i64 = if scale == 0 { 0 } else { padded.parse().ok()? };

    Some((whole, fraction))
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for receipts, logs and the line display string. Localized
/// formatting belongs to the front end.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
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

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
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
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_tax_calculation_with_rounding() {
        let amount = Money::from_cents(1000);
        assert_eq!(amount.calculate_tax(TaxRate::from_bps(1000)).cents(), 100);
        assert_eq!(amount.calculate_tax(TaxRate::from_bps(825)).cents(), 83);
    }

    #[test]
    fn test_times_whole_units_is_exact() {
        let unit_price = Money::from_cents(299);
        assert_eq!(unit_price.times(Quantity::units(3)), unit_price * 3);
    }

    #[test]
    fn test_times_weight_rounds_half_up() {
        // $4.50/kg × 0.333 kg = 149.85 cents → 150
        let per_kg = Money::from_cents(450);
        assert_eq!(per_kg.times(Quantity::from_milli(333)).cents(), 150);
        // $1.00/kg × 0.005 kg = 0.5 cents → 1
        assert_eq!(Money::from_cents(100).times(Quantity::from_milli(5)).cents(), 1);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("20"), Some(Money::from_cents(2000)));
        assert_eq!(Money::parse_decimal("0.05"), Some(Money::from_cents(5)));
        assert_eq!(Money::parse_decimal(".5"), Some(Money::from_cents(50)));
        assert_eq!(Money::parse_decimal("12."), Some(Money::from_cents(1200)));
        assert_eq!(Money::parse_decimal(""), None);
        assert_eq!(Money::parse_decimal("."), None);
        assert_eq!(Money::parse_decimal("-1"), None);
        assert_eq!(Money::parse_decimal("1.2.3"), None);
    }

    #[test]
    fn test_change_fails_closed() {
        let total = Money::from_cents(1083);
        assert_eq!(total.change_from(Money::from_cents(1083)), Some(Money::zero()));
        assert_eq!(total.change_from(Money::from_cents(1082)), None);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 5].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.cents(), 355);
    }
}
