//! # Domain Types
//!
//! Core domain types used throughout Tally POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Catalog                 Inventory                  Sales               │
//! │  ───────                 ─────────                  ─────               │
//! │  Product                 StockAdjustment            OrderRequest        │
//! │  ├── PricingMode         ├── AdjustmentReason       ├── OrderLine       │
//! │  └── ProductVariant      StockReservation           Order               │
//! │  ItemKey                 ├── ReservationStatus      PaymentRecord       │
//! │  TaxRate                 StockTransfer              PaymentMethod       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! A sellable thing is identified by `(product_id, variant_id?)`, carried as
//! [`ItemKey`]. The same key identifies a cart line, a stock counter and a
//! reservation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 825 bps = 8.25%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for configuration convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Item Identity
// =============================================================================

/// Composite identity of a product or one of its variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemKey {
    pub product_id: String,
    pub variant_id: Option<String>,
}

impl ItemKey {
    pub fn product(product_id: impl Into<String>) -> Self {
        ItemKey {
            product_id: product_id.into(),
            variant_id: None,
        }
    }

    pub fn variant(product_id: impl Into<String>, variant_id: impl Into<String>) -> Self {
        ItemKey {
            product_id: product_id.into(),
            variant_id: Some(variant_id.into()),
        }
    }

    /// Stable string id used by the cart and the display (`product` or
    /// `product::variant`).
    pub fn item_id(&self) -> String {
        match &self.variant_id {
            Some(variant) => format!("{}::{}", self.product_id, variant),
            None => self.product_id.clone(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.item_id())
    }
}

// =============================================================================
// Product
// =============================================================================

/// How a product is priced at the till.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    /// Counted items at a fixed unit price.
    #[default]
    Unit,
    /// Loose goods priced per kilogram; the scale reading is the quantity.
    Weight,
    /// Custom-priced: the cashier keys the price at the till.
    Open,
}

/// A variant (size, flavour, ...) of a product with an optional price override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: String,
    pub name: String,
    pub sku: Option<String>,
    /// Overrides the product's base price when present.
    pub price_cents: Option<i64>,
}

/// A product available for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Base price in cents (per item, or per kg for weight products).
    pub price_cents: i64,
    pub pricing_mode: PricingMode,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    /// Whether sales and reservations are checked against available stock.
    pub track_inventory: bool,
    pub is_active: bool,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    pub fn find_variant(&self, variant_id: &str) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Price for the product or one of its variants.
    pub fn price_for(&self, variant: Option<&ProductVariant>) -> Money {
        variant
            .and_then(|v| v.price_cents)
            .map(Money::from_cents)
            .unwrap_or_else(|| self.price())
    }

    /// Line label: product name, with the variant name appended.
    pub fn label_for(&self, variant: Option<&ProductVariant>) -> String {
        match variant {
            Some(v) => format!("{} ({})", self.name, v.name),
            None => self.name.clone(),
        }
    }

    pub fn key_for(&self, variant: Option<&ProductVariant>) -> ItemKey {
        ItemKey {
            product_id: self.id.clone(),
            variant_id: variant.map(|v| v.id.clone()),
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash; requires the received amount to compute change.
    Cash,
    /// Card payment on an external terminal.
    ExternalCard,
}

impl PaymentMethod {
    pub fn requires_cash_capture(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::ExternalCard => write!(f, "external_card"),
        }
    }
}

/// Payment details sent with an order for settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub method: PaymentMethod,
    /// Amount applied to the order (always the order total).
    pub amount: Money,
    /// Cash handed over by the customer.
    pub tendered: Option<Money>,
    /// Cash returned to the customer.
    pub change: Option<Money>,
}

// =============================================================================
// Stock Adjustment
// =============================================================================

/// Why a stock counter changed. Closed set.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentReason {
    Sale,
    Return,
    Damage,
    Theft,
    Correction,
    Receipt,
    Transfer,
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdjustmentReason::Sale => "SALE",
            AdjustmentReason::Return => "RETURN",
            AdjustmentReason::Damage => "DAMAGE",
            AdjustmentReason::Theft => "THEFT",
            AdjustmentReason::Correction => "CORRECTION",
            AdjustmentReason::Receipt => "RECEIPT",
            AdjustmentReason::Transfer => "TRANSFER",
        };
        f.write_str(s)
    }
}

/// Command to atomically change one stock counter on the remote store.
///
/// The client never reads, modifies and writes stock itself; the store
/// applies `quantity_change` as a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub item: ItemKey,
    /// Signed delta in stock units.
    pub quantity_change: i64,
    pub reason: AdjustmentReason,
    pub notes: Option<String>,
    /// Caller-supplied reference for audit and reconciliation
    /// (e.g. `transfer:<id>:debit`).
    pub reference: Option<String>,
}

/// The store's durable record of an applied adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRecord {
    pub id: String,
    pub item: ItemKey,
    pub quantity_change: i64,
    pub reason: AdjustmentReason,
    pub notes: Option<String>,
    pub reference: Option<String>,
    /// Counter value after the adjustment was applied.
    pub resulting_stock: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Reservation
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Expired,
    Released,
    Confirmed,
}

/// A provisional hold on stock for a pending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockReservation {
    pub id: String,
    pub item: ItemKey,
    /// Held quantity in stock units.
    pub quantity: i64,
    pub status: ReservationStatus,
    /// Checkout session that owns the hold.
    pub order_ref: Option<String>,
    #[ts(as = "String")]
    pub reserved_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

impl StockReservation {
    /// An ACTIVE hold whose deadline has passed.
    pub fn is_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && now > self.expires_at
    }

    /// Returns the reservation as it should be seen at `now`: lapsed ACTIVE
    /// holds are reported as EXPIRED. Nothing is written back.
    pub fn classified_at(mut self, now: DateTime<Utc>) -> Self {
        if self.is_lapsed_at(now) {
            self.status = ReservationStatus::Expired;
        }
        self
    }
}

/// Request to hold stock for an order entering checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    pub item: ItemKey,
    pub quantity: i64,
    pub order_ref: String,
    pub expires_at: DateTime<Utc>,
}

/// Filter for listing reservations. Empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationFilter {
    pub item: Option<ItemKey>,
    pub order_ref: Option<String>,
    pub status: Option<ReservationStatus>,
}

impl ReservationFilter {
    pub fn for_order(order_ref: impl Into<String>) -> Self {
        ReservationFilter {
            order_ref: Some(order_ref.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: ReservationStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Applies the filter to a reservation as stored.
    pub fn matches(&self, reservation: &StockReservation) -> bool {
        self.item.as_ref().map_or(true, |item| &reservation.item == item)
            && self
                .order_ref
                .as_ref()
                .map_or(true, |r| reservation.order_ref.as_deref() == Some(r.as_str()))
            && self.status.map_or(true, |s| reservation.status == s)
    }
}

// =============================================================================
// Stock Transfer
// =============================================================================

/// Ephemeral saga input: move `quantity` stock units from one item to another.
///
/// `from`/`to` are `None` until the operator has picked both products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransfer {
    pub from: Option<ItemKey>,
    pub to: Option<ItemKey>,
    pub quantity: i64,
    pub notes: Option<String>,
}

// =============================================================================
// Order
// =============================================================================

/// One settled line (snapshot of the cart line at settlement time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub item: ItemKey,
    pub name: String,
    pub pricing_mode: PricingMode,
    pub quantity: Quantity,
    pub weight: Option<Quantity>,
    pub unit_price: Money,
    pub total_price: Money,
    /// Stock units the store decrements for this line.
    pub stock_units: i64,
}

/// What the terminal sends to the store to settle an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Client-generated id; doubles as the reservation `order_ref`.
    pub order_id: String,
    pub store_id: String,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub tax_rate: TaxRate,
    pub total: Money,
    pub payment: PaymentRecord,
    /// Reservations the settlement confirms.
    pub reservation_ids: Vec<String>,
}

/// A settled order as recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub receipt_number: String,
    pub store_id: String,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub tax_rate: TaxRate,
    pub total: Money,
    pub payment: PaymentRecord,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
