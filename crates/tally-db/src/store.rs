//! # Stock Store Contract
//!
//! The remote operations the terminal consumes, behind one async trait.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        StockStore (trait)                               │
//! │                                                                         │
//! │  adjust_stock(cmd)               atomic delta, one call = one counter  │
//! │  reserve_stock(req)              soft hold for a pending order         │
//! │  release_reservation(id)         explicit cancel of a hold             │
//! │  list_reservations(filter)       as stored, no reclassification        │
//! │  cleanup_expired_reservations()  persist EXPIRED for lapsed holds      │
//! │  settle_order(req)               decrement + confirm + record, atomic  │
//! │  product_name_exists(name)       uniqueness check for the name field   │
//! │                                                                         │
//! │        ▲                                   ▲                            │
//! │        │                                   │                            │
//! │   SqliteStore (sqlx)                 MemoryStore (tests, demos)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers never read-modify-write stock: every change is a delta the store
//! applies atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::stock::StockLevel;
use tally_core::{
    AdjustmentRecord, ItemKey, Order, OrderRequest, Product, ReservationFilter, ReservationRequest,
    StockAdjustment, StockReservation,
};

/// Remote store operations used by the terminal.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Applies one signed delta to one counter.
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> DbResult<AdjustmentRecord>;

    /// Stock position of one item.
    async fn stock_level(&self, item: &ItemKey) -> DbResult<StockLevel>;

    /// Places a soft hold.
    async fn reserve_stock(&self, request: ReservationRequest) -> DbResult<StockReservation>;

    /// Releases an ACTIVE hold.
    async fn release_reservation(&self, reservation_id: &str) -> DbResult<StockReservation>;

    /// Lists holds exactly as stored.
    async fn list_reservations(&self, filter: &ReservationFilter) -> DbResult<Vec<StockReservation>>;

    /// Persists EXPIRED on ACTIVE holds with `expires_at < now`. Returns the count.
    async fn cleanup_expired_reservations(&self, now: DateTime<Utc>) -> DbResult<u64>;

    /// Settles an order; replaying a settled order id returns the stored order.
    async fn settle_order(&self, request: OrderRequest) -> DbResult<Order>;

    async fn find_product(&self, product_id: &str) -> DbResult<Option<Product>>;

    /// True if a product other than `exclude_id` already uses `name`.
    async fn product_name_exists(&self, name: &str, exclude_id: Option<&str>) -> DbResult<bool>;
}

// =============================================================================
// SQLite Backend
// =============================================================================

/// [`StockStore`] over the SQLite reference database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl StockStore for SqliteStore {
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> DbResult<AdjustmentRecord> {
        self.db.stock().adjust(&adjustment).await
    }

    async fn stock_level(&self, item: &ItemKey) -> DbResult<StockLevel> {
        self.db.stock().level(item).await
    }

    async fn reserve_stock(&self, request: ReservationRequest) -> DbResult<StockReservation> {
        self.db.reservations().reserve(&request, Utc::now()).await
    }

    async fn release_reservation(&self, reservation_id: &str) -> DbResult<StockReservation> {
        self.db.reservations().release(reservation_id).await
    }

    async fn list_reservations(&self, filter: &ReservationFilter) -> DbResult<Vec<StockReservation>> {
        self.db.reservations().list(filter).await
    }

    async fn cleanup_expired_reservations(&self, now: DateTime<Utc>) -> DbResult<u64> {
        self.db.reservations().expire_lapsed(now).await
    }

    async fn settle_order(&self, request: OrderRequest) -> DbResult<Order> {
        self.db.orders().settle(&request).await
    }

    async fn find_product(&self, product_id: &str) -> DbResult<Option<Product>> {
        self.db.products().get_by_id(product_id).await
    }

    async fn product_name_exists(&self, name: &str, exclude_id: Option<&str>) -> DbResult<bool> {
        self.db.products().name_exists(name, exclude_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use std::sync::Arc;
    use tally_core::{AdjustmentReason, PricingMode};

    #[tokio::test]
    async fn test_sqlite_store_behind_trait_object() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products()
            .insert(&Product {
                id: "a".into(),
                sku: "A".into(),
                name: "Product A".into(),
                price_cents: 100,
                pricing_mode: PricingMode::Unit,
                variants: vec![],
                track_inventory: true,
                is_active: true,
            })
            .await
            .unwrap();

        let store: Arc<dyn StockStore> = Arc::new(SqliteStore::new(db));
        let record = store
            .adjust_stock(StockAdjustment {
                item: ItemKey::product("a"),
                quantity_change: 10,
                reason: AdjustmentReason::Receipt,
                notes: Some("opening count".into()),
                reference: None,
            })
            .await
            .unwrap();

        assert_eq!(record.resulting_stock, 10);
        assert_eq!(store.stock_level(&ItemKey::product("a")).await.unwrap().available, 10);
        assert!(store.product_name_exists("product a", None).await.unwrap());
        assert!(store.find_product("a").await.unwrap().is_some());
    }
}
