//! # Quantity Module
//!
//! Measured quantities in integer thousandths ("milli-units").
//!
//! ## Why Milli-Units?
//! A unit-counted line holds whole items (3 cans), a loose-weight line holds
//! a scale reading (1.250 kg). Both flow into the same price formula
//! `unit_price × quantity`, so both share one integer representation:
//!
//! ```text
//! 3 cans      → Quantity(3000)
//! 1.250 kg    → Quantity(1250)
//! 0.005 kg    → Quantity(5)
//! ```
//!
//! Stock counters are integers in *stock units*: one per item for
//! unit-counted products, one gram for loose-weight products. See
//! [`Quantity::stock_units`].

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::split_decimal;
use crate::types::PricingMode;

/// Milli-units in one whole unit (or one kilogram).
pub const MILLI_PER_UNIT: i64 = 1000;

/// A measured quantity in thousandths of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Whole units (items).
    #[inline]
    pub const fn units(n: i64) -> Self {
        Quantity(n * MILLI_PER_UNIT)
    }

    /// Raw thousandths (a weight of 1.25 kg is `from_milli(1250)`).
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// True when the quantity has no fractional part.
    #[inline]
    pub const fn is_whole(&self) -> bool {
        self.0 % MILLI_PER_UNIT == 0
    }

    /// Whole units, truncating any fraction.
    #[inline]
    pub const fn whole_units(&self) -> i64 {
        self.0 / MILLI_PER_UNIT
    }

    /// Converts to the integer stock counter unit for the pricing mode.
    ///
    /// ```rust
    /// use tally_core::quantity::Quantity;
    /// use tally_core::types::PricingMode;
    ///
    /// assert_eq!(Quantity::units(3).stock_units(PricingMode::Unit), 3);
    /// assert_eq!(Quantity::from_milli(1250).stock_units(PricingMode::Weight), 1250);
    /// ```
    pub const fn stock_units(&self, mode: PricingMode) -> i64 {
        match mode {
            PricingMode::Weight => self.0,
            PricingMode::Unit | PricingMode::Open => self.whole_units(),
        }
    }

    /// Parses a decimal typed on the numpad with up to three fraction digits.
    ///
    /// ```rust
    /// use tally_core::quantity::Quantity;
    ///
    /// assert_eq!(Quantity::parse_decimal("1.25"), Some(Quantity::from_milli(1250)));
    /// assert_eq!(Quantity::parse_decimal("4"), Some(Quantity::units(4)));
    /// assert_eq!(Quantity::parse_decimal("0.0001"), None);
    /// ```
    pub fn parse_decimal(input: &str) -> Option<Self> {
        let (whole, fraction) = split_decimal(input.trim(), 3)?;
        let milli = whole.checked_mul(MILLI_PER_UNIT)?.checked_add(fraction)?;
        Some(Quantity(milli))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole() {
            write!(f, "{}", self.whole_units())
        } else {
            let sign = if self.0 < 0 { "-" } else { "" };
            write!(f, "{}{}.{:03}", sign, (self.0 / MILLI_PER_UNIT).abs(), (self.0 % MILLI_PER_UNIT).abs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_and_milli() {
        assert_eq!(Quantity::units(2).milli(), 2000);
        assert!(Quantity::units(2).is_whole());
        assert!(!Quantity::from_milli(2500).is_whole());
        assert_eq!(Quantity::from_milli(2500).whole_units(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(Quantity::units(3).to_string(), "3");
        assert_eq!(Quantity::from_milli(1250).to_string(), "1.250");
        assert_eq!(Quantity::from_milli(5).to_string(), "0.005");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Quantity::parse_decimal("0.5"), Some(Quantity::from_milli(500)));
        assert_eq!(Quantity::parse_decimal("2."), Some(Quantity::units(2)));
        assert_eq!(Quantity::parse_decimal("x"), None);
        assert_eq!(Quantity::parse_decimal(""), None);
    }

    #[test]
    fn test_stock_units() {
        assert_eq!(Quantity::units(7).stock_units(PricingMode::Unit), 7);
        assert_eq!(Quantity::units(1).stock_units(PricingMode::Open), 1);
        assert_eq!(Quantity::from_milli(800).stock_units(PricingMode::Weight), 800);
    }
}
