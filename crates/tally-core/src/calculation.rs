//! # Calculation Module
//!
//! Pure pricing over a [`Cart`]: subtotal, tax, total and cash change.
//!
//! ```text
//! subtotal = Σ line.total_price
//! tax      = round_half_up(subtotal × bps / 10000)
//! total    = subtotal + tax
//! ```
//!
//! An empty cart has **no** calculation (`None`), which callers treat as
//! "no active order" rather than "an order worth $0.00".

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::Cart;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::TaxRate;

/// Derived totals for one cart revision. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub subtotal: Money,
    pub tax: Money,
    pub tax_rate: TaxRate,
    pub total: Money,
    pub line_count: usize,
    /// Cart revision the totals were computed from.
    pub revision: u64,
}

impl CalculationResult {
    /// True when the totals describe exactly the cart as it is now.
    #[inline]
    pub fn is_current_for(&self, cart: &Cart) -> bool {
        self.revision == cart.revision()
    }
}

/// Prices the cart. Returns `None` for an empty cart.
///
/// ```rust
/// use tally_core::calculation::calculate;
/// use tally_core::cart::Cart;
/// use tally_core::types::TaxRate;
///
/// assert!(calculate(&Cart::new(), TaxRate::from_bps(825)).is_none());
/// ```
pub fn calculate(cart: &Cart, tax_rate: TaxRate) -> Option<CalculationResult> {
    if cart.is_empty() {
        return None;
    }

    let subtotal = cart.subtotal();
    let tax = subtotal.calculate_tax(tax_rate);

    Some(CalculationResult {
        subtotal,
        tax,
        tax_rate,
        total: subtotal + tax,
        line_count: cart.len(),
        revision: cart.revision(),
    })
}

/// Settlement precondition: totals present, current, and every line priced.
pub fn ensure_settleable<'a>(
    cart: &Cart,
    calculation: Option<&'a CalculationResult>,
) -> CoreResult<&'a CalculationResult> {
    let calculation = calculation.ok_or(CoreError::EmptyCart)?;
    if cart.is_empty() {
        return Err(CoreError::EmptyCart);
    }
    if !calculation.is_current_for(cart) {
        return Err(CoreError::StaleCalculation {
            calculated: calculation.revision,
            current: cart.revision(),
        });
    }
    if let Some(line) = cart.first_pending() {
        return Err(CoreError::UnpricedLine(line.name.clone()));
    }
    Ok(calculation)
}

/// Change owed for a cash payment. Fails closed when `received < total`.
///
/// ```rust
/// use tally_core::calculation::change_due;
/// use tally_core::money::Money;
///
/// let change = change_due(Money::from_cents(2000), Money::from_cents(1299)).unwrap();
/// assert_eq!(change.cents(), 701);
/// assert!(change_due(Money::from_cents(1000), Money::from_cents(1299)).is_err());
/// ```
pub fn change_due(received: Money, total: Money) -> CoreResult<Money> {
    total
        .change_from(received)
        .ok_or(CoreError::InsufficientCash { received, total })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::LineUpdate;
    use crate::quantity::Quantity;
    use crate::types::{PricingMode, Product};
    use proptest::prelude::*;

    fn product(id: &str, cents: i64, mode: PricingMode) -> Product {
        Product {
            id: id.to_string(),
            sku: id.to_uppercase(),
            name: id.to_string(),
            price_cents: cents,
            pricing_mode: mode,
            variants: Vec::new(),
            track_inventory: true,
            is_active: true,
        }
    }

    #[test]
    fn test_calculate_totals() {
        let mut cart = Cart::new();
        cart.add_item(&product("a", 1099, PricingMode::Unit), None).unwrap();
        cart.add_item(&product("a", 1099, PricingMode::Unit), None).unwrap();
        cart.add_item(&product("b", 250, PricingMode::Unit), None).unwrap();

        let calc = calculate(&cart, TaxRate::from_bps(825)).unwrap();
        assert_eq!(calc.subtotal.cents(), 2448);
        // 2448 × 0.0825 = 201.96 → 202
        assert_eq!(calc.tax.cents(), 202);
        assert_eq!(calc.total.cents(), 2650);
        assert_eq!(calc.line_count, 2);
        assert!(calc.is_current_for(&cart));
    }

    #[test]
    fn test_empty_cart_has_no_calculation() {
        let mut cart = Cart::new();
        cart.add_item(&product("a", 100, PricingMode::Unit), None).unwrap();
        cart.clear();
        assert!(calculate(&cart, TaxRate::from_bps(825)).is_none());
    }

    #[test]
    fn test_stale_calculation_rejected() {
        let mut cart = Cart::new();
        cart.add_item(&product("a", 100, PricingMode::Unit), None).unwrap();
        let calc = calculate(&cart, TaxRate::zero());
        cart.add_item(&product("b", 100, PricingMode::Unit), None).unwrap();

        let err = ensure_settleable(&cart, calc.as_ref()).unwrap_err();
        assert_eq!(
            err,
            CoreError::StaleCalculation {
                calculated: 1,
                current: 2
            }
        );
    }

    #[test]
    fn test_unweighed_line_blocks_settlement() {
        let mut cart = Cart::new();
        cart.add_item(&product("apples", 400, PricingMode::Weight), None)
            .unwrap();
        let calc = calculate(&cart, TaxRate::zero());
        assert!(matches!(
            ensure_settleable(&cart, calc.as_ref()),
            Err(CoreError::UnpricedLine(_))
        ));

        cart.update_item("apples", LineUpdate::weight(Quantity::from_milli(750)))
            .unwrap();
        let calc = calculate(&cart, TaxRate::zero());
        let calc = ensure_settleable(&cart, calc.as_ref()).unwrap();
        assert_eq!(calc.total.cents(), 300);
    }

    #[test]
    fn test_change_exact() {
        assert_eq!(
            change_due(Money::from_cents(1299), Money::from_cents(1299)).unwrap(),
            Money::zero()
        );
    }

    proptest! {
        #[test]
        fn prop_totals_are_consistent(
            lines in prop::collection::vec((1i64..100_000, 1i64..20, any::<bool>()), 1..30),
            bps in 0u32..3000,
        ) {
            let mut cart = Cart::new();
            for (i, (cents, qty, weighted)) in lines.iter().enumerate() {
                let id = format!("p{i}");
                if *weighted {
                    cart.add_item(&product(&id, *cents, PricingMode::Weight), None).unwrap();
                    cart.update_item(&id, LineUpdate::weight(Quantity::from_milli(qty * 137))).unwrap();
                } else {
                    cart.add_item(&product(&id, *cents, PricingMode::Unit), None).unwrap();
                    cart.update_item(&id, LineUpdate::quantity(Quantity::units(*qty))).unwrap();
                }
            }

            let rate = TaxRate::from_bps(bps);
            let calc = calculate(&cart, rate).unwrap();
            let sum: Money = cart.items().iter().map(|l| l.total_price).sum();

            prop_assert_eq!(calc.subtotal, sum);
            prop_assert_eq!(calc.total, calc.subtotal + calc.subtotal.calculate_tax(rate));
            for line in cart.items() {
                prop_assert_eq!(line.total_price, line.unit_price.times(line.measured()));
            }
        }
    }
}
