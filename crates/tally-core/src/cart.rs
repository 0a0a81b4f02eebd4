//! # Cart Module
//!
//! The in-memory line-item collection for one checkout session.
//!
//! ## Line Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PricingMode   add_item                     priced when                 │
//! │  ───────────   ─────────────────────────    ─────────────────────────   │
//! │  Unit          qty 1 (or +1 on same key)    immediately                 │
//! │  Weight        placeholder, weight 0        weight committed (numpad)   │
//! │  Open          qty 1, price 0               price committed (numpad)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `total_price = unit_price × (weight ?? quantity)` is recomputed inside
//! every mutation, so a line is never observed with a stale total.
//!
//! ## Revisions
//! Every successful mutation bumps [`Cart::revision`]. A
//! [`CalculationResult`](crate::calculation::CalculationResult) remembers
//! the revision it was derived from, which is how settlement detects stale
//! totals.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::numpad::NumpadMode;
use crate::quantity::Quantity;
use crate::types::{ItemKey, PricingMode, Product};
use crate::validation::{validate_cart_size, validate_price_cents, validate_quantity, validate_weight};
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Line Item
// =============================================================================

/// A value the line still needs before it can be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PendingCapture {
    Weight,
    Price,
}

impl PendingCapture {
    pub fn numpad_mode(&self) -> NumpadMode {
        match self {
            PendingCapture::Weight => NumpadMode::Weight,
            PendingCapture::Price => NumpadMode::Price,
        }
    }
}

/// One line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Stable line id (`ItemKey::item_id`).
    pub id: String,
    pub item: ItemKey,
    pub name: String,
    pub pricing_mode: PricingMode,
    /// For weight lines this mirrors `weight`.
    pub quantity: Quantity,
    /// Scale reading for loose-weight lines, `None` otherwise.
    pub weight: Option<Quantity>,
    pub unit_price: Money,
    pub total_price: Money,
    /// Human-readable line description ("2 × $1.50", "1.250 kg @ $4.00/kg").
    pub display: String,
    pub track_inventory: bool,
    pub pending: Option<PendingCapture>,
}

impl LineItem {
    fn new(product: &Product, variant_id: Option<&str>) -> CoreResult<Self> {
        let variant = match variant_id {
            Some(id) => Some(product.find_variant(id).ok_or_else(|| CoreError::VariantNotFound {
                product_id: product.id.clone(),
                variant_id: id.to_string(),
            })?),
            None => None,
        };
        let item = product.key_for(variant);

        let (quantity, weight, unit_price, pending) = match product.pricing_mode {
            PricingMode::Unit => (Quantity::units(1), None, product.price_for(variant), None),
            PricingMode::Weight => (
                Quantity::zero(),
                Some(Quantity::zero()),
                product.price_for(variant),
                Some(PendingCapture::Weight),
            ),
            PricingMode::Open => (Quantity::units(1), None, Money::zero(), Some(PendingCapture::Price)),
        };

        let mut line = LineItem {
            id: item.item_id(),
            item,
            name: product.label_for(variant),
            pricing_mode: product.pricing_mode,
            quantity,
            weight,
            unit_price,
            total_price: Money::zero(),
            display: String::new(),
            track_inventory: product.track_inventory,
            pending,
        };
        line.recompute();
        Ok(line)
    }

    /// True for loose-weight lines.
    #[inline]
    pub fn is_weighted(&self) -> bool {
        self.pricing_mode == PricingMode::Weight
    }

    /// The measured value the price multiplies.
    #[inline]
    pub fn measured(&self) -> Quantity {
        self.weight.unwrap_or(self.quantity)
    }

    /// Stock units this line takes out of inventory.
    #[inline]
    pub fn stock_units(&self) -> i64 {
        self.measured().stock_units(self.pricing_mode)
    }

    fn recompute(&mut self) {
        self.total_price = self.unit_price.times(self.measured());
        self.display = match (self.pending, self.pricing_mode) {
            (Some(PendingCapture::Weight), _) => "Weigh item".to_string(),
            (Some(PendingCapture::Price), _) => "Enter price".to_string(),
            (None, PricingMode::Weight) => {
                format!("{} kg @ {}/kg", self.measured(), self.unit_price)
            }
            (None, _) => format!("{} × {}", self.quantity, self.unit_price),
        };
    }
}

// =============================================================================
// Mutations
// =============================================================================

/// Partial update merged into a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineUpdate {
    pub quantity: Option<Quantity>,
    pub weight: Option<Quantity>,
    pub unit_price: Option<Money>,
}

impl LineUpdate {
    pub fn quantity(quantity: Quantity) -> Self {
        LineUpdate {
            quantity: Some(quantity),
            ..Default::default()
        }
    }

    pub fn weight(weight: Quantity) -> Self {
        LineUpdate {
            weight: Some(weight),
            ..Default::default()
        }
    }

    pub fn unit_price(price: Money) -> Self {
        LineUpdate {
            unit_price: Some(price),
            ..Default::default()
        }
    }
}

/// A request for the numpad to capture a value for a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub mode: NumpadMode,
    pub item_id: String,
}

/// Result of [`Cart::add_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub item_id: String,
    /// Set when the line cannot be priced until the numpad commits a value.
    pub capture: Option<CaptureRequest>,
}

/// Result of [`Cart::update_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// Quantity went to zero and the line was dropped.
    Removed,
}

// =============================================================================
// Cart
// =============================================================================

/// Ordered line items keyed by item identity. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<LineItem>,
    revision: u64,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn get(&self, item_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|l| l.id == item_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subtotal(&self) -> Money {
        self.items.iter().map(|l| l.total_price).sum()
    }

    /// First line still waiting on a numpad capture.
    pub fn first_pending(&self) -> Option<&LineItem> {
        self.items.iter().find(|l| l.pending.is_some())
    }

    /// Adds one of `product` (or the given variant).
    ///
    /// ## Behavior
    /// ```text
    /// same key already in cart?
    ///   ├── yes, still pending capture  → re-request the capture
    ///   ├── yes, Weight                 → re-request weight (re-weigh)
    ///   ├── yes, Unit / Open            → quantity + 1
    ///   └── no                          → insert new line (limit checked)
    /// ```
    pub fn add_item(&mut self, product: &Product, variant_id: Option<&str>) -> CoreResult<AddOutcome> {
        if !product.is_active {
            return Err(CoreError::ProductInactive(product.id.clone()));
        }

        let line = LineItem::new(product, variant_id)?;

        if let Some(existing) = self.items.iter_mut().find(|l| l.id == line.id) {
            let item_id = existing.id.clone();

            if let Some(pending) = existing.pending {
                return Ok(AddOutcome {
                    capture: Some(CaptureRequest {
                        mode: pending.numpad_mode(),
                        item_id: item_id.clone(),
                    }),
                    item_id,
                });
            }

            if existing.is_weighted() {
                return Ok(AddOutcome {
                    capture: Some(CaptureRequest {
                        mode: NumpadMode::Weight,
                        item_id: item_id.clone(),
                    }),
                    item_id,
                });
            }

            let next = existing.quantity.whole_units() + 1;
            if next > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: next,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            existing.quantity = Quantity::units(next);
            existing.recompute();
            self.revision += 1;
            return Ok(AddOutcome {
                item_id,
                capture: None,
            });
        }

        validate_cart_size(self.items.len()).map_err(|_| CoreError::CartTooLarge {
            max: crate::MAX_CART_ITEMS,
        })?;

        let outcome = AddOutcome {
            item_id: line.id.clone(),
            capture: line.pending.map(|p| CaptureRequest {
                mode: p.numpad_mode(),
                item_id: line.id.clone(),
            }),
        };
        self.items.push(line);
        self.revision += 1;
        Ok(outcome)
    }

    /// Merges `update` into the line and recomputes its total.
    ///
    /// A quantity of zero on a unit-counted or custom-priced line removes it.
    /// On weight lines a quantity is treated as the weight.
    pub fn update_item(&mut self, item_id: &str, update: LineUpdate) -> CoreResult<UpdateOutcome> {
        let index = self
            .items
            .iter()
            .position(|l| l.id == item_id)
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?;

        let mut line = self.items[index].clone();

        if line.is_weighted() {
            if let Some(weight) = update.weight.or(update.quantity) {
                validate_weight(weight)?;
                line.weight = Some(weight);
                line.quantity = weight;
                if line.pending == Some(PendingCapture::Weight) {
                    line.pending = None;
                }
            }
        } else {
            if update.weight.is_some() {
                return Err(CoreError::FieldNotApplicable {
                    item_id: item_id.to_string(),
                    field: "weight".to_string(),
                });
            }
            if let Some(quantity) = update.quantity {
                if quantity.is_zero() {
                    self.items.remove(index);
                    self.revision += 1;
                    return Ok(UpdateOutcome::Removed);
                }
                if !quantity.is_whole() {
                    return Err(CoreError::FieldNotApplicable {
                        item_id: item_id.to_string(),
                        field: "fractional quantity".to_string(),
                    });
                }
                validate_quantity(quantity.whole_units())?;
                line.quantity = quantity;
            }
        }

        if let Some(price) = update.unit_price {
            validate_price_cents(price.cents())?;
            line.unit_price = price;
            if line.pending == Some(PendingCapture::Price) {
                line.pending = None;
            }
        }

        line.recompute();
        self.items[index] = line;
        self.revision += 1;
        Ok(UpdateOutcome::Updated)
    }

    /// Deletes the line and returns it.
    pub fn remove_item(&mut self, item_id: &str) -> CoreResult<LineItem> {
        let index = self
            .items
            .iter()
            .position(|l| l.id == item_id)
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?;
        let line = self.items.remove(index);
        self.revision += 1;
        Ok(line)
    }

    /// Empties the cart. The revision still advances.
    pub fn clear(&mut self) {
        self.items.clear();
        self.revision += 1;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
