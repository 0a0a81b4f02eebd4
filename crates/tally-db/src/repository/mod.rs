//! # Repository Module
//!
//! SQL for the SQLite store, one repository per aggregate.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SqliteStore (StockStore impl)                                          │
//! │       │                                                                 │
//! │       │  db.stock().adjust(adjustment)                                 │
//! │       ▼                                                                 │
//! │  ProductRepository      catalog rows, name uniqueness                  │
//! │  StockRepository        delta updates + adjustment audit trail         │
//! │  ReservationRepository  soft holds, release, expiry cleanup            │
//! │  OrderRepository        settlement in one transaction                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod order;
pub mod product;
pub mod reservation;
pub mod stock;

use tally_core::ItemKey;

/// Column value for an optional variant (`''` when absent).
pub(crate) fn variant_column(item: &ItemKey) -> &str {
    item.variant_id.as_deref().unwrap_or("")
}

/// Rebuilds an item key from its two columns.
pub(crate) fn item_from_columns(product_id: String, variant_id: String) -> ItemKey {
    ItemKey {
        product_id,
        variant_id: if variant_id.is_empty() { None } else { Some(variant_id) },
    }
}
