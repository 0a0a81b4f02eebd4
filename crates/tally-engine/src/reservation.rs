//! # Stock Reservation Client
//!
//! Uniform command interface over the remote stock store.
//!
//! ## Commands
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  StockCommand ──► StockOutcome                          │
//! │                                                                         │
//! │  Adjust(StockAdjustment)   ──► Adjusted(AdjustmentRecord)               │
//! │  Reserve(request)          ──► Reserved(StockReservation)               │
//! │  Release { id }            ──► Released(StockReservation)               │
//! │  List(filter)              ──► Listed(Vec<StockReservation>)  *lazy*    │
//! │  CleanupExpired            ──► Cleaned(count)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lazy Expiry
//! Nothing here runs on a timer. `List` reports an ACTIVE hold whose
//! deadline has passed as EXPIRED in the returned view only. The store keeps
//! it ACTIVE until `CleanupExpired` is called explicitly.

use std::sync::Arc;

use chrono::Duration;
use tally_core::{
    AdjustmentRecord, ItemKey, Order, OrderRequest, Product, ReservationFilter, ReservationRequest,
    StockAdjustment, StockReservation,
};
use tally_db::{DbError, DbResult, StockLevel, StockStore};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockCommand {
    Adjust(StockAdjustment),
    Reserve(ReservationRequest),
    Release { reservation_id: String },
    List(ReservationFilter),
    CleanupExpired,
}

impl StockCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StockCommand::Adjust(_) => "adjust",
            StockCommand::Reserve(_) => "reserve",
            StockCommand::Release { .. } => "release",
            StockCommand::List(_) => "list",
            StockCommand::CleanupExpired => "cleanup_expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockOutcome {
    Adjusted(AdjustmentRecord),
    Reserved(StockReservation),
    Released(StockReservation),
    Listed(Vec<StockReservation>),
    Cleaned(u64),
}

#[derive(Clone)]
pub struct StockReservationClient {
    store: Arc<dyn StockStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StockReservationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockReservationClient").finish_non_exhaustive()
    }
}

impl StockReservationClient {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn StockStore>, clock: Arc<dyn Clock>) -> Self {
        StockReservationClient { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn StockStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Runs one command against the store.
    pub async fn execute(&self, command: StockCommand) -> DbResult<StockOutcome> {
        let name = command.name();
        let result = match command {
            StockCommand::Adjust(adjustment) => self.store.adjust_stock(adjustment).await.map(StockOutcome::Adjusted),
            StockCommand::Reserve(request) => self.store.reserve_stock(request).await.map(StockOutcome::Reserved),
            StockCommand::Release { reservation_id } => self
                .store
                .release_reservation(&reservation_id)
                .await
                .map(StockOutcome::Released),
            StockCommand::List(filter) => {
                let now = self.clock.now();
                self.store.list_reservations(&filter).await.map(|list| {
                    StockOutcome::Listed(list.into_iter().map(|r| r.classified_at(now)).collect())
                })
            }
            StockCommand::CleanupExpired => self
                .store
                .cleanup_expired_reservations(self.clock.now())
                .await
                .map(StockOutcome::Cleaned),
        };

        if let Err(err) = &result {
            warn!(command = name, error = %err, "Stock command failed");
        }
        result
    }

    // =========================================================================
    // Typed helpers
    // =========================================================================

    pub async fn adjust(&self, adjustment: StockAdjustment) -> DbResult<AdjustmentRecord> {
        match self.execute(StockCommand::Adjust(adjustment)).await? {
            StockOutcome::Adjusted(record) => {
                debug!(
                    item = %record.item,
                    change = record.quantity_change,
                    reason = %record.reason,
                    resulting = record.resulting_stock,
                    "Stock adjusted"
                );
                Ok(record)
            }
            other => Err(unexpected("adjust", &other)),
        }
    }

    /// Holds `quantity` stock units of `item` for `order_ref` until `now + ttl`.
    pub async fn reserve(
        &self,
        item: ItemKey,
        quantity: i64,
        order_ref: &str,
        ttl: Duration,
    ) -> DbResult<StockReservation> {
        let request = ReservationRequest {
            item,
            quantity,
            order_ref: order_ref.to_string(),
            expires_at: self.clock.now() + ttl,
        };
        match self.execute(StockCommand::Reserve(request)).await? {
            StockOutcome::Reserved(reservation) => {
                debug!(
                    reservation_id = %reservation.id,
                    item = %reservation.item,
                    quantity = reservation.quantity,
                    expires_at = %reservation.expires_at,
                    "Stock reserved"
                );
                Ok(reservation)
            }
            other => Err(unexpected("reserve", &other)),
        }
    }

    pub async fn release(&self, reservation_id: &str) -> DbResult<StockReservation> {
        let command = StockCommand::Release {
            reservation_id: reservation_id.to_string(),
        };
        match self.execute(command).await? {
            StockOutcome::Released(reservation) => {
                debug!(reservation_id = %reservation.id, status = ?reservation.status, "Reservation released");
                Ok(reservation)
            }
            other => Err(unexpected("release", &other)),
        }
    }

    /// Lists holds, reporting lapsed ACTIVE ones as EXPIRED without writing.
    pub async fn list_reservations(&self, filter: ReservationFilter) -> DbResult<Vec<StockReservation>> {
        match self.execute(StockCommand::List(filter)).await? {
            StockOutcome::Listed(list) => Ok(list),
            other => Err(unexpected("list", &other)),
        }
    }

    /// Persists EXPIRED on lapsed holds. Stock is not returned automatically.
    pub async fn cleanup_expired(&self) -> DbResult<u64> {
        match self.execute(StockCommand::CleanupExpired).await? {
            StockOutcome::Cleaned(count) => {
                info!(expired = count, "Expired reservations cleaned up");
                Ok(count)
            }
            other => Err(unexpected("cleanup_expired", &other)),
        }
    }

    pub async fn stock_level(&self, item: &ItemKey) -> DbResult<StockLevel> {
        self.store.stock_level(item).await
    }

    pub async fn settle_order(&self, request: OrderRequest) -> DbResult<Order> {
        self.store.settle_order(request).await
    }

    pub async fn find_product(&self, product_id: &str) -> DbResult<Option<Product>> {
        self.store.find_product(product_id).await
    }
}

fn unexpected(command: &str, outcome: &StockOutcome) -> DbError {
    DbError::Internal(format!("{command} returned unexpected outcome {outcome:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tally_core::{AdjustmentReason, PricingMode, ReservationStatus};
    use tally_db::{MemoryStore, StoreOp};

    fn product(id: &str) -> Product {
        Product {
            id: id.to_string(),
            sku: id.to_uppercase(),
            name: format!("Product {id}"),
            price_cents: 100,
            pricing_mode: PricingMode::Unit,
            variants: Vec::new(),
            track_inventory: true,
            is_active: true,
        }
    }

    fn client() -> (StockReservationClient, MemoryStore, ManualClock) {
        let store = MemoryStore::new().with_product(product("a"), 10);
        let clock = ManualClock::default();
        let client = StockReservationClient::with_clock(Arc::new(store.clone()), Arc::new(clock.clone()));
        (client, store, clock)
    }

    #[tokio::test]
    async fn test_adjust_command() {
        let (client, store, _) = client();
        let outcome = client
            .execute(StockCommand::Adjust(StockAdjustment {
                item: ItemKey::product("a"),
                quantity_change: -4,
                reason: AdjustmentReason::Damage,
                notes: Some("dropped".into()),
                reference: None,
            }))
            .await
            .unwrap();

        match outcome {
            StockOutcome::Adjusted(record) => assert_eq!(record.resulting_stock, 6),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(store.on_hand(&ItemKey::product("a")), 6);
    }

    #[tokio::test]
    async fn test_list_reclassifies_lapsed_holds_without_writing() {
        let (client, store, clock) = client();
        let hold = client
            .reserve(ItemKey::product("a"), 2, "order-1", Duration::minutes(15))
            .await
            .unwrap();

        clock.advance(Duration::minutes(16));

        let listed = client.list_reservations(ReservationFilter::for_order("order-1")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ReservationStatus::Expired);

        // Still ACTIVE on the store until cleanup runs.
        assert_eq!(store.reservation(&hold.id).unwrap().status, ReservationStatus::Active);

        assert_eq!(client.cleanup_expired().await.unwrap(), 1);
        assert_eq!(store.reservation(&hold.id).unwrap().status, ReservationStatus::Expired);
    }

    #[tokio::test]
    async fn test_unexpired_holds_stay_active_in_listing() {
        let (client, _, clock) = client();
        client
            .reserve(ItemKey::product("a"), 2, "order-1", Duration::minutes(15))
            .await
            .unwrap();
        clock.advance(Duration::minutes(5));

        let listed = client.list_reservations(ReservationFilter::for_order("order-1")).await.unwrap();
        assert_eq!(listed[0].status, ReservationStatus::Active);
    }

    #[tokio::test]
    async fn test_release_and_errors_pass_through() {
        let (client, store, _) = client();
        let hold = client
            .reserve(ItemKey::product("a"), 1, "order-1", Duration::minutes(15))
            .await
            .unwrap();

        let released = client.release(&hold.id).await.unwrap();
        assert_eq!(released.status, ReservationStatus::Released);

        store.fail(StoreOp::Reserve, DbError::Unavailable("store offline".into()));
        let err = client
            .reserve(ItemKey::product("a"), 1, "order-2", Duration::minutes(15))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Unavailable(ref m) if m == "store offline"));
    }
}
