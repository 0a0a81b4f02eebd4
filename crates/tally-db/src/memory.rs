//! # In-Memory Store
//!
//! A [`StockStore`] held in process memory, with failure injection.
//!
//! Used by engine tests and demos to drive partial-failure paths the
//! SQLite backend cannot produce on demand:
//!
//! ```rust,ignore
//! let store = MemoryStore::new()
//!     .with_product(product_a, 10)
//!     .with_product(product_b, 5);
//!
//! // Make the credit leg of a transfer fail
//! store.fail_adjustments_matching(
//!     |adj| adj.item.product_id == "b",
//!     DbError::Unavailable("store timeout".into()),
//! );
//! ```
//!
//! Semantics match [`SqliteStore`](crate::store::SqliteStore): deltas
//! only, debits may not take a tracked item below zero, holds reduce
//! available stock, settlement replays are idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::order::generate_receipt_number;
use crate::repository::stock::StockLevel;
use crate::store::StockStore;
use tally_core::{
    AdjustmentReason, AdjustmentRecord, ItemKey, Order, OrderRequest, Product, ReservationFilter,
    ReservationRequest, ReservationStatus, StockAdjustment, StockReservation,
};

/// Store operations, for failure injection and call assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Adjust,
    StockLevel,
    Reserve,
    Release,
    ListReservations,
    CleanupExpired,
    Settle,
    FindProduct,
    NameExists,
}

type AdjustmentMatcher = Arc<dyn Fn(&StockAdjustment) -> bool + Send + Sync>;

struct FailureRule {
    op: StoreOp,
    matcher: Option<AdjustmentMatcher>,
    error: DbError,
    /// `None` fails every matching call.
    remaining: Option<usize>,
}

impl fmt::Debug for FailureRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureRule")
            .field("op", &self.op)
            .field("matcher", &self.matcher.is_some())
            .field("error", &self.error)
            .field("remaining", &self.remaining)
            .finish()
    }
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<String, Product>,
    on_hand: HashMap<ItemKey, i64>,
    adjustments: Vec<AdjustmentRecord>,
    reservations: Vec<StockReservation>,
    orders: HashMap<String, Order>,
    failures: Vec<FailureRule>,
    calls: Vec<StoreOp>,
}

impl State {
    /// Records the call and returns the injected error, if any rule matches.
    fn check(&mut self, op: StoreOp, adjustment: Option<&StockAdjustment>) -> DbResult<()> {
        self.calls.push(op);

        let hit = self.failures.iter().position(|rule| {
            rule.op == op
                && rule.remaining != Some(0)
                && match (&rule.matcher, adjustment) {
                    (Some(matcher), Some(adj)) => matcher(adj),
                    (Some(_), None) => false,
                    (None, _) => true,
                }
        });

        match hit {
            Some(index) => {
                let rule = &mut self.failures[index];
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                debug!(?op, error = %rule.error, "Injected store failure");
                Err(rule.error.clone())
            }
            None => Ok(()),
        }
    }

    fn resolve(&self, item: &ItemKey) -> DbResult<&Product> {
        let product = self
            .products
            .get(&item.product_id)
            .ok_or_else(|| DbError::not_found("Product", &item.product_id))?;
        if let Some(variant_id) = &item.variant_id {
            product
                .find_variant(variant_id)
                .ok_or_else(|| DbError::not_found("Variant", item.to_string()))?;
        }
        Ok(product)
    }

    fn level(&self, item: &ItemKey) -> StockLevel {
        let on_hand = self.on_hand.get(item).copied().unwrap_or(0);
        let reserved = self
            .reservations
            .iter()
            .filter(|r| &r.item == item && r.status == ReservationStatus::Active)
            .map(|r| r.quantity)
            .sum();
        StockLevel {
            on_hand,
            reserved,
            available: on_hand - reserved,
        }
    }

    fn apply(&mut self, adjustment: &StockAdjustment, now: DateTime<Utc>) -> DbResult<AdjustmentRecord> {
        let track_inventory = self.resolve(&adjustment.item)?.track_inventory;
        let current = self.on_hand.get(&adjustment.item).copied().unwrap_or(0);
        let resulting_stock = current + adjustment.quantity_change;

        if adjustment.quantity_change < 0 && track_inventory && resulting_stock < 0 {
            return Err(DbError::InsufficientStock {
                item: adjustment.item.to_string(),
                available: current,
                requested: -adjustment.quantity_change,
            });
        }

        self.on_hand.insert(adjustment.item.clone(), resulting_stock);
        let record = AdjustmentRecord {
            id: Uuid::new_v4().to_string(),
            item: adjustment.item.clone(),
            quantity_change: adjustment.quantity_change,
            reason: adjustment.reason,
            notes: adjustment.notes.clone(),
            reference: adjustment.reference.clone(),
            resulting_stock,
            created_at: now,
        };
        self.adjustments.push(record.clone());
        Ok(record)
    }
}

/// In-process [`StockStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic in another test thread must not hide this store's state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a product with an opening on-hand count (for the base item).
    pub fn with_product(self, product: Product, on_hand: i64) -> Self {
        {
            let mut state = self.lock();
            state.on_hand.insert(ItemKey::product(&product.id), on_hand);
            state.products.insert(product.id.clone(), product);
        }
        self
    }

    /// Sets the on-hand count of any item directly (test setup only).
    pub fn set_on_hand(&self, item: ItemKey, on_hand: i64) {
        self.lock().on_hand.insert(item, on_hand);
    }

    pub fn on_hand(&self, item: &ItemKey) -> i64 {
        self.lock().on_hand.get(item).copied().unwrap_or(0)
    }

    /// Every adjustment applied, in order.
    pub fn adjustments(&self) -> Vec<AdjustmentRecord> {
        self.lock().adjustments.clone()
    }

    pub fn reservation(&self, id: &str) -> Option<StockReservation> {
        self.lock().reservations.iter().find(|r| r.id == id).cloned()
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.lock().orders.get(id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    /// Every call made against the store, in order.
    pub fn calls(&self) -> Vec<StoreOp> {
        self.lock().calls.clone()
    }

    /// Fails every call to `op` with `error` until cleared.
    pub fn fail(&self, op: StoreOp, error: DbError) {
        self.lock().failures.push(FailureRule {
            op,
            matcher: None,
            error,
            remaining: None,
        });
    }

    /// Fails the next `times` calls to `op`.
    pub fn fail_times(&self, op: StoreOp, times: usize, error: DbError) {
        self.lock().failures.push(FailureRule {
            op,
            matcher: None,
            error,
            remaining: Some(times),
        });
    }

    /// Fails every adjustment for which `matcher` returns true.
    pub fn fail_adjustments_matching<F>(&self, matcher: F, error: DbError)
    where
        F: Fn(&StockAdjustment) -> bool + Send + Sync + 'static,
    {
        self.lock().failures.push(FailureRule {
            op: StoreOp::Adjust,
            matcher: Some(Arc::new(matcher)),
            error,
            remaining: None,
        });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }
}

#[async_trait]
impl StockStore for MemoryStore {
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> DbResult<AdjustmentRecord> {
        let mut state = self.lock();
        state.check(StoreOp::Adjust, Some(&adjustment))?;
        state.apply(&adjustment, Utc::now())
    }

    async fn stock_level(&self, item: &ItemKey) -> DbResult<StockLevel> {
        let mut state = self.lock();
        state.check(StoreOp::StockLevel, None)?;
        state.resolve(item)?;
        Ok(state.level(item))
    }

    async fn reserve_stock(&self, request: ReservationRequest) -> DbResult<StockReservation> {
        let mut state = self.lock();
        state.check(StoreOp::Reserve, None)?;

        if request.quantity <= 0 {
            return Err(DbError::QueryFailed("reservation quantity must be positive".to_string()));
        }
        if state.resolve(&request.item)?.track_inventory {
            let level = state.level(&request.item);
            if level.available < request.quantity {
                return Err(DbError::InsufficientStock {
                    item: request.item.to_string(),
                    available: level.available,
                    requested: request.quantity,
                });
            }
        }

        let reservation = StockReservation {
            id: Uuid::new_v4().to_string(),
            item: request.item,
            quantity: request.quantity,
            status: ReservationStatus::Active,
            order_ref: Some(request.order_ref),
            reserved_at: Utc::now(),
            expires_at: request.expires_at,
        };
        state.reservations.push(reservation.clone());
        Ok(reservation)
    }

    async fn release_reservation(&self, reservation_id: &str) -> DbResult<StockReservation> {
        let mut state = self.lock();
        state.check(StoreOp::Release, None)?;

        let reservation = state
            .reservations
            .iter_mut()
            .find(|r| r.id == reservation_id)
            .ok_or_else(|| DbError::not_found("Reservation", reservation_id))?;

        match reservation.status {
            ReservationStatus::Active => reservation.status = ReservationStatus::Released,
            ReservationStatus::Confirmed => {
                return Err(DbError::invalid_state("Reservation", reservation_id, "CONFIRMED"))
            }
            ReservationStatus::Released | ReservationStatus::Expired => {}
        }
        Ok(reservation.clone())
    }

    async fn list_reservations(&self, filter: &ReservationFilter) -> DbResult<Vec<StockReservation>> {
        let mut state = self.lock();
        state.check(StoreOp::ListReservations, None)?;
        Ok(state
            .reservations
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn cleanup_expired_reservations(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let mut state = self.lock();
        state.check(StoreOp::CleanupExpired, None)?;

        let mut expired = 0;
        for reservation in state.reservations.iter_mut() {
            if reservation.status == ReservationStatus::Active && reservation.expires_at < now {
                reservation.status = ReservationStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn settle_order(&self, request: OrderRequest) -> DbResult<Order> {
        let mut state = self.lock();
        state.check(StoreOp::Settle, None)?;

        if let Some(existing) = state.orders.get(&request.order_id) {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        // Apply on a scratch copy so a failing line leaves nothing behind.
        let snapshot_on_hand = state.on_hand.clone();
        let snapshot_len = state.adjustments.len();

        for line in &request.lines {
            if line.stock_units == 0 {
                continue;
            }
            let result = state.apply(
                &StockAdjustment {
                    item: line.item.clone(),
                    quantity_change: -line.stock_units,
                    reason: AdjustmentReason::Sale,
                    notes: None,
                    reference: Some(format!("order:{}", request.order_id)),
                },
                now,
            );
            if let Err(err) = result {
                state.on_hand = snapshot_on_hand;
                state.adjustments.truncate(snapshot_len);
                return Err(err);
            }
        }

        for reservation in state.reservations.iter_mut() {
            if reservation.status == ReservationStatus::Active && request.reservation_ids.contains(&reservation.id) {
                reservation.status = ReservationStatus::Confirmed;
            }
        }

        let order = Order {
            id: request.order_id.clone(),
            receipt_number: generate_receipt_number(&request.store_id, now),
            store_id: request.store_id,
            lines: request.lines,
            subtotal: request.subtotal,
            tax: request.tax,
            tax_rate: request.tax_rate,
            total: request.total,
            payment: request.payment,
            created_at: now,
        };
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn find_product(&self, product_id: &str) -> DbResult<Option<Product>> {
        let mut state = self.lock();
        state.check(StoreOp::FindProduct, None)?;
        Ok(state.products.get(product_id).cloned())
    }

    async fn product_name_exists(&self, name: &str, exclude_id: Option<&str>) -> DbResult<bool> {
        let mut state = self.lock();
        state.check(StoreOp::NameExists, None)?;
        let wanted = name.trim().to_lowercase();
        Ok(state
            .products
            .values()
            .any(|p| Some(p.id.as_str()) != exclude_id && p.name.trim().to_lowercase() == wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tally_core::PricingMode;

    fn product(id: &str) -> Product {
        Product {
            id: id.into(),
            sku: id.to_uppercase(),
            name: format!("Product {id}"),
            price_cents: 100,
            pricing_mode: PricingMode::Unit,
            variants: vec![],
            track_inventory: true,
            is_active: true,
        }
    }

    fn debit(id: &str, qty: i64) -> StockAdjustment {
        StockAdjustment {
            item: ItemKey::product(id),
            quantity_change: -qty,
            reason: AdjustmentReason::Transfer,
            notes: None,
            reference: None,
        }
    }

    #[tokio::test]
    async fn test_adjust_and_floor() {
        let store = MemoryStore::new().with_product(product("a"), 3);

        store.adjust_stock(debit("a", 2)).await.unwrap();
        assert_eq!(store.on_hand(&ItemKey::product("a")), 1);

        let err = store.adjust_stock(debit("a", 2)).await.unwrap_err();
        assert!(matches!(err, DbError::InsufficientStock { available: 1, .. }));
        assert_eq!(store.on_hand(&ItemKey::product("a")), 1);
    }

    #[tokio::test]
    async fn test_matching_failure_injection() {
        let store = MemoryStore::new()
            .with_product(product("a"), 10)
            .with_product(product("b"), 10);
        store.fail_adjustments_matching(
            |adj| adj.item.product_id == "b",
            DbError::Unavailable("timeout".into()),
        );

        assert!(store.adjust_stock(debit("a", 1)).await.is_ok());
        assert!(matches!(
            store.adjust_stock(debit("b", 1)).await,
            Err(DbError::Unavailable(_))
        ));
        assert_eq!(store.calls(), vec![StoreOp::Adjust, StoreOp::Adjust]);

        store.clear_failures();
        assert!(store.adjust_stock(debit("b", 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_times_runs_out() {
        let store = MemoryStore::new().with_product(product("a"), 10);
        store.fail_times(StoreOp::Adjust, 1, DbError::Unavailable("blip".into()));

        assert!(store.adjust_stock(debit("a", 1)).await.is_err());
        assert!(store.adjust_stock(debit("a", 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_settle_failure_leaves_stock_untouched() {
        let store = MemoryStore::new()
            .with_product(product("a"), 10)
            .with_product(product("b"), 1);
        let now = Utc::now();
        let hold = store
            .reserve_stock(ReservationRequest {
                item: ItemKey::product("a"),
                quantity: 2,
                order_ref: "o-1".into(),
                expires_at: now + Duration::minutes(5),
            })
            .await
            .unwrap();

        let line = |id: &str, units: i64| tally_core::OrderLine {
            item: ItemKey::product(id),
            name: id.into(),
            pricing_mode: PricingMode::Unit,
            quantity: tally_core::Quantity::units(units),
            weight: None,
            unit_price: tally_core::Money::from_cents(100),
            total_price: tally_core::Money::from_cents(100 * units),
            stock_units: units,
        };
        let request = OrderRequest {
            order_id: "o-1".into(),
            store_id: "s-1".into(),
            lines: vec![line("a", 2), line("b", 5)],
            subtotal: tally_core::Money::from_cents(700),
            tax: tally_core::Money::zero(),
            tax_rate: tally_core::TaxRate::zero(),
            total: tally_core::Money::from_cents(700),
            payment: tally_core::PaymentRecord {
                method: tally_core::PaymentMethod::ExternalCard,
                amount: tally_core::Money::from_cents(700),
                tendered: None,
                change: None,
            },
            reservation_ids: vec![hold.id.clone()],
        };

        assert!(store.settle_order(request).await.is_err());
        assert_eq!(store.on_hand(&ItemKey::product("a")), 10);
        assert_eq!(
            store.reservation(&hold.id).unwrap().status,
            ReservationStatus::Active
        );
        assert_eq!(store.order_count(), 0);
    }
}
