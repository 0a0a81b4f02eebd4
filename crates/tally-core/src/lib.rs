//! # tally-core: Pure Business Logic for Tally POS
//!
//! Cart math, pricing and numpad capture as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                tally-engine (terminal session)                  │   │
//! │  │   CartEngine ──► CheckoutOrchestrator ──► TransferSaga          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │  money  │ │  cart   │ │  calc   │ │ numpad  │  │   │
//! │  │   │ Product │ │  Money  │ │  Cart   │ │ totals  │ │ capture │  │   │
//! │  │   │  Order  │ │Quantity │ │LineItem │ │ change  │ │  modes  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO TIMERS                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        tally-db (remote stock store)  /  tally-display          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, StockAdjustment, StockReservation, Order)
//! - [`money`] - Money in integer cents
//! - [`quantity`] - Quantities in integer thousandths
//! - [`cart`] - Line items and cart mutations
//! - [`calculation`] - Subtotal, tax, total, change
//! - [`numpad`] - Numeric capture state machine
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::calculation::calculate;
//! use tally_core::cart::Cart;
//! use tally_core::types::{PricingMode, Product, TaxRate};
//!
//! let cola = Product {
//!     id: "cola".into(),
//!     sku: "COLA-330".into(),
//!     name: "Cola 330ml".into(),
//!     price_cents: 1099,
//!     pricing_mode: PricingMode::Unit,
//!     variants: vec![],
//!     track_inventory: true,
//!     is_active: true,
//! };
//!
//! let mut cart = Cart::new();
//! cart.add_item(&cola, None).unwrap();
//!
//! let calc = calculate(&cart, TaxRate::from_bps(825)).unwrap();
//! assert_eq!(calc.tax.cents(), 91);
//! assert_eq!(calc.total.cents(), 1190);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod calculation;
pub mod cart;
pub mod error;
pub mod money;
pub mod numpad;
pub mod quantity;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use calculation::CalculationResult;
pub use cart::{Cart, LineItem, LineUpdate};
pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use numpad::{NumpadMode, NumpadSession, NumpadValue};
pub use quantity::Quantity;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single unit-counted line.
///
/// Catches slips like typing 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum weight on one loose-weight line, in grams (999.999 kg).
pub const MAX_LINE_WEIGHT_MILLI: i64 = 999_999;

/// Maximum product name length, in characters.
pub const MAX_PRODUCT_NAME_LEN: usize = 200;
