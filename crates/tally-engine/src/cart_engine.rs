//! # Cart Engine
//!
//! Owns the session's cart, reprices it after every mutation, and tells
//! subscribers that it changed.
//!
//! ## Mutation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Engine Operations                               │
//! │                                                                         │
//! │  add_item() ────┐                                                       │
//! │  update_item() ─┼──► Cart mutation ──► calculate() ──► watch::send      │
//! │  remove_item() ─┤        │                  │                           │
//! │  clear() ───────┘        │ Err              │ empty cart → None         │
//! │                          ▼                  ▼                           │
//! │                   nothing changes     CartChange { revision, totals }   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Totals are recomputed synchronously inside the mutation, so a reader can
//! never observe a cart and a calculation from different revisions.

use serde::Serialize;
use tally_core::calculation::calculate;
use tally_core::cart::{AddOutcome, UpdateOutcome};
use tally_core::error::CoreResult;
use tally_core::{CalculationResult, Cart, LineItem, LineUpdate, Product, TaxRate};
use tokio::sync::watch;
use tracing::debug;

/// "Cart changed" notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartChange {
    pub revision: u64,
    pub line_count: usize,
    /// `None` means there is no active order.
    pub calculation: Option<CalculationResult>,
}

#[derive(Debug)]
pub struct CartEngine {
    cart: Cart,
    tax_rate: TaxRate,
    calculation: Option<CalculationResult>,
    changes: watch::Sender<CartChange>,
}

impl CartEngine {
    pub fn new(tax_rate: TaxRate) -> Self {
        let cart = Cart::new();
        let (changes, _) = watch::channel(CartChange {
            revision: cart.revision(),
            line_count: 0,
            calculation: None,
        });
        CartEngine {
            cart,
            tax_rate,
            calculation: None,
            changes,
        }
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn calculation(&self) -> Option<&CalculationResult> {
        self.calculation.as_ref()
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn is_empty(&self) -> bool {
        self.cart.is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<CartChange> {
        self.changes.subscribe()
    }

    pub fn add_item(&mut self, product: &Product, variant_id: Option<&str>) -> CoreResult<AddOutcome> {
        let before = self.cart.revision();
        let outcome = self.cart.add_item(product, variant_id)?;
        debug!(item_id = %outcome.item_id, capture = ?outcome.capture.as_ref().map(|c| c.mode), "Cart add");
        if self.cart.revision() != before {
            self.refresh();
        }
        Ok(outcome)
    }

    pub fn update_item(&mut self, item_id: &str, update: LineUpdate) -> CoreResult<UpdateOutcome> {
        let outcome = self.cart.update_item(item_id, update)?;
        debug!(item_id = %item_id, ?outcome, "Cart update");
        self.refresh();
        Ok(outcome)
    }

    pub fn remove_item(&mut self, item_id: &str) -> CoreResult<LineItem> {
        let line = self.cart.remove_item(item_id)?;
        debug!(item_id = %item_id, "Cart remove");
        self.refresh();
        Ok(line)
    }

    pub fn clear(&mut self) {
        self.cart.clear();
        debug!("Cart cleared");
        self.refresh();
    }

    fn refresh(&mut self) {
        self.calculation = calculate(&self.cart, self.tax_rate);
        self.changes.send_replace(CartChange {
            revision: self.cart.revision(),
            line_count: self.cart.len(),
            calculation: self.calculation,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::cart::PendingCapture;
    use tally_core::{NumpadMode, PricingMode, Quantity};

    fn product(id: &str, cents: i64, mode: PricingMode) -> Product {
        Product {
            id: id.to_string(),
            sku: id.to_uppercase(),
            name: format!("Product {id}"),
            price_cents: cents,
            pricing_mode: mode,
            variants: Vec::new(),
            track_inventory: true,
            is_active: true,
        }
    }

    #[test]
    fn test_same_product_twice_is_one_line() {
        let mut engine = CartEngine::new(TaxRate::from_bps(825));
        let milk = product("milk", 299, PricingMode::Unit);

        engine.add_item(&milk, None).unwrap();
        engine.add_item(&milk, None).unwrap();

        assert_eq!(engine.cart().len(), 1);
        assert_eq!(engine.cart().items()[0].quantity, Quantity::units(2));
        let calc = engine.calculation().unwrap();
        assert_eq!(calc.subtotal.cents(), 598);
        assert_eq!(calc.tax.cents(), 49);
        assert_eq!(calc.total.cents(), 647);
    }

    #[test]
    fn test_weight_line_priced_after_weight_update() {
        let mut engine = CartEngine::new(TaxRate::zero());
        let apples = product("apples", 400, PricingMode::Weight);

        let outcome = engine.add_item(&apples, None).unwrap();
        let capture = outcome.capture.unwrap();
        assert_eq!(capture.mode, NumpadMode::Weight);

        let line = engine.cart().get(&outcome.item_id).unwrap();
        assert_eq!(line.pending, Some(PendingCapture::Weight));
        assert!(line.total_price.is_zero());

        engine
            .update_item(&outcome.item_id, LineUpdate::weight(Quantity::from_milli(1250)))
            .unwrap();
        let line = engine.cart().get(&outcome.item_id).unwrap();
        assert_eq!(line.pending, None);
        assert_eq!(line.total_price.cents(), 500);
        assert_eq!(engine.calculation().unwrap().total.cents(), 500);
    }

    #[test]
    fn test_empty_cart_has_no_calculation() {
        let mut engine = CartEngine::new(TaxRate::from_bps(825));
        let milk = product("milk", 299, PricingMode::Unit);

        let outcome = engine.add_item(&milk, None).unwrap();
        assert!(engine.calculation().is_some());

        engine.remove_item(&outcome.item_id).unwrap();
        assert!(engine.calculation().is_none());

        engine.add_item(&milk, None).unwrap();
        engine.clear();
        assert!(engine.calculation().is_none());
    }

    #[test]
    fn test_subscribers_see_every_mutation() {
        let mut engine = CartEngine::new(TaxRate::zero());
        let mut changes = engine.subscribe();
        let milk = product("milk", 299, PricingMode::Unit);

        engine.add_item(&milk, None).unwrap();
        assert!(changes.has_changed().unwrap());
        let change = changes.borrow_and_update().clone();
        assert_eq!(change.line_count, 1);
        assert_eq!(change.revision, engine.cart().revision());
        assert_eq!(change.calculation.unwrap().total.cents(), 299);

        assert!(engine.update_item("missing", LineUpdate::quantity(Quantity::units(2))).is_err());
        assert!(!changes.has_changed().unwrap());
    }

    #[test]
    fn test_calculation_always_matches_revision() {
        let mut engine = CartEngine::new(TaxRate::from_bps(700));
        let milk = product("milk", 299, PricingMode::Unit);
        let bread = product("bread", 350, PricingMode::Unit);

        engine.add_item(&milk, None).unwrap();
        engine.add_item(&bread, None).unwrap();
        engine
            .update_item("bread", LineUpdate::quantity(Quantity::units(3)))
            .unwrap();

        let calc = engine.calculation().unwrap();
        assert!(calc.is_current_for(engine.cart()));
        assert_eq!(calc.subtotal.cents(), 299 + 1050);
    }
}
