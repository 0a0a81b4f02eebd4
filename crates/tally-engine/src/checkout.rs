//! # Checkout Orchestrator
//!
//! Drives one order from a priced cart to a settled order.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Building ──select_payment──► PaymentSelected ──(card)──► Settling      │
//! │     │                              │                        │    │      │
//! │     │                           (cash)                      │    │      │
//! │     │                              ▼                        │    │      │
//! │     │                        AwaitingCash ──confirm_cash────┘    │      │
//! │     │                              │                  ok ▼       ▼ err  │
//! │     └──────cancel──────────────────┴──► Cancelled   Completed  Failed   │
//! │                                                                  │      │
//! │                                     retry (same order id) ◄──────┤      │
//! │                                     return_to_cart ──► Building ◄┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Settlement requires totals computed from exactly the cart being settled.
//! - A failed settlement keeps the cart so the cashier can retry.
//! - Nothing can be cancelled once `Settling` starts.
//! - Stock is held when payment is selected and released explicitly on cancel.

use chrono::Duration;
use serde::Serialize;
use tally_core::calculation::{change_due, ensure_settleable};
use tally_core::{Money, Order, OrderLine, OrderRequest, PaymentMethod, PaymentRecord, StockReservation};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cart_engine::CartEngine;
use crate::config::TerminalConfig;
use crate::error::{CheckoutError, CheckoutResult, ErrorNotice};
use crate::reservation::StockReservationClient;

// =============================================================================
// States
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", rename_all_fields = "camelCase", tag = "state")]
pub enum CheckoutState {
    Building,
    PaymentSelected {
        method: PaymentMethod,
        amount_due: Money,
    },
    /// Cash payment waiting for the received amount from the numpad.
    AwaitingCash {
        amount_due: Money,
    },
    Settling {
        method: PaymentMethod,
    },
    Completed {
        order: Order,
        change: Option<Money>,
    },
    Failed {
        method: PaymentMethod,
        error: ErrorNotice,
    },
    Cancelled,
}

impl CheckoutState {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutState::Building => "building",
            CheckoutState::PaymentSelected { .. } => "payment_selected",
            CheckoutState::AwaitingCash { .. } => "awaiting_cash",
            CheckoutState::Settling { .. } => "settling",
            CheckoutState::Completed { .. } => "completed",
            CheckoutState::Failed { .. } => "failed",
            CheckoutState::Cancelled => "cancelled",
        }
    }

    /// The order is over; the next edit starts a new one.
    pub fn is_finished(&self) -> bool {
        matches!(self, CheckoutState::Completed { .. } | CheckoutState::Cancelled)
    }

    /// True before settlement has started.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            CheckoutState::Building | CheckoutState::PaymentSelected { .. } | CheckoutState::AwaitingCash { .. }
        )
    }
}

/// What the caller should do after `select_payment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutStep {
    /// Open a cash capture for at least `amount_due`.
    AwaitingCash { amount_due: Money },
    Completed(CheckoutReceipt),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub order: Order,
    pub change: Option<Money>,
}

#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    pub store_id: String,
    pub reserve_on_checkout: bool,
    pub reservation_ttl: Duration,
}

impl CheckoutOptions {
    pub fn from_config(config: &TerminalConfig) -> Self {
        CheckoutOptions {
            store_id: config.store.id.clone(),
            reserve_on_checkout: config.checkout.reserve_on_checkout,
            reservation_ttl: config.reservation_ttl(),
        }
    }
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        CheckoutOptions::from_config(&TerminalConfig::default())
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Debug)]
pub struct CheckoutOrchestrator {
    client: StockReservationClient,
    options: CheckoutOptions,
    /// Reused across retries so settlement stays idempotent.
    order_id: String,
    reservations: Vec<StockReservation>,
    reserved_revision: Option<u64>,
    failed_payment: Option<PaymentRecord>,
    state: watch::Sender<CheckoutState>,
}

impl CheckoutOrchestrator {
    pub fn new(client: StockReservationClient, options: CheckoutOptions) -> Self {
        let (state, _) = watch::channel(CheckoutState::Building);
        CheckoutOrchestrator {
            client,
            options,
            order_id: Uuid::new_v4().to_string(),
            reservations: Vec::new(),
            reserved_revision: None,
            failed_payment: None,
            state,
        }
    }

    pub fn state(&self) -> CheckoutState {
        self.state.borrow().clone()
    }

    pub fn is_building(&self) -> bool {
        matches!(*self.state.borrow(), CheckoutState::Building)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.state.borrow(), CheckoutState::Cancelled)
    }

    pub fn is_finished(&self) -> bool {
        self.state.borrow().is_finished()
    }

    pub fn state_name(&self) -> &'static str {
        self.state.borrow().name()
    }

    /// "State changed" notifications.
    pub fn subscribe(&self) -> watch::Receiver<CheckoutState> {
        self.state.subscribe()
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn reservations(&self) -> &[StockReservation] {
        &self.reservations
    }

    /// Makes the cart editable. Starts a new order after a completed or
    /// cancelled one.
    pub fn begin_editing(&mut self) -> CheckoutResult<()> {
        if self.is_building() {
            return Ok(());
        }
        if !self.is_finished() {
            return Err(CheckoutError::InvalidTransition {
                action: "edit the cart",
                state: self.state_name(),
            });
        }
        self.start_new_order();
        Ok(())
    }

    /// Picks a payment method. Cash waits for `confirm_cash`; any other method
    /// settles straight away.
    pub async fn select_payment(&mut self, method: PaymentMethod, cart: &mut CartEngine) -> CheckoutResult<CheckoutStep> {
        if !self.state.borrow().is_cancellable() {
            return Err(CheckoutError::InvalidTransition {
                action: "select a payment method",
                state: self.state_name(),
            });
        }

        let total = ensure_settleable(cart.cart(), cart.calculation())?.total;

        if self.options.reserve_on_checkout && self.reserved_revision != Some(cart.cart().revision()) {
            if let Err(err) = self.release_all().await {
                warn!(order_id = %self.order_id, error = %err, "Stale holds could not all be released");
            }
            self.reserve_lines(cart).await?;
        }

        self.transition(CheckoutState::PaymentSelected {
            method,
            amount_due: total,
        });

        if method.requires_cash_capture() {
            self.transition(CheckoutState::AwaitingCash { amount_due: total });
            return Ok(CheckoutStep::AwaitingCash { amount_due: total });
        }

        let payment = PaymentRecord {
            method,
            amount: total,
            tendered: None,
            change: None,
        };
        self.settle(cart, payment).await.map(CheckoutStep::Completed)
    }

    /// Settles a cash payment. Short cash is rejected and the capture stays open.
    pub async fn confirm_cash(&mut self, received: Money, cart: &mut CartEngine) -> CheckoutResult<CheckoutReceipt> {
        if !matches!(*self.state.borrow(), CheckoutState::AwaitingCash { .. }) {
            return Err(CheckoutError::InvalidTransition {
                action: "confirm cash",
                state: self.state_name(),
            });
        }

        let total = ensure_settleable(cart.cart(), cart.calculation())?.total;
        let change = change_due(received, total).inspect_err(|_| {
            info!(order_id = %self.order_id, received = %received, total = %total, "Cash below total rejected");
        })?;

        let payment = PaymentRecord {
            method: PaymentMethod::Cash,
            amount: total,
            tendered: Some(received),
            change: Some(change),
        };
        self.settle(cart, payment).await
    }

    /// Posts the order to the store. On success the cart is cleared; on
    /// failure it is kept and the state becomes `Failed`.
    pub async fn settle(&mut self, cart: &mut CartEngine, payment: PaymentRecord) -> CheckoutResult<CheckoutReceipt> {
        let settleable = matches!(
            *self.state.borrow(),
            CheckoutState::PaymentSelected { .. } | CheckoutState::AwaitingCash { .. } | CheckoutState::Failed { .. }
        );
        if !settleable {
            return Err(CheckoutError::InvalidTransition {
                action: "settle",
                state: self.state_name(),
            });
        }

        let calculation = *ensure_settleable(cart.cart(), cart.calculation())?;

        let request = OrderRequest {
            order_id: self.order_id.clone(),
            store_id: self.options.store_id.clone(),
            lines: cart
                .cart()
                .items()
                .iter()
                .map(|line| OrderLine {
                    item: line.item.clone(),
                    name: line.name.clone(),
                    pricing_mode: line.pricing_mode,
                    quantity: line.quantity,
                    weight: line.weight,
                    unit_price: line.unit_price,
                    total_price: line.total_price,
                    stock_units: line.stock_units(),
                })
                .collect(),
            subtotal: calculation.subtotal,
            tax: calculation.tax,
            tax_rate: calculation.tax_rate,
            total: calculation.total,
            payment: payment.clone(),
            reservation_ids: self.reservations.iter().map(|r| r.id.clone()).collect(),
        };

        self.transition(CheckoutState::Settling { method: payment.method });

        match self.client.settle_order(request).await {
            Ok(order) => {
                info!(
                    order_id = %order.id,
                    receipt = %order.receipt_number,
                    total = %order.total,
                    method = %payment.method,
                    "Order settled"
                );
                self.reservations.clear();
                self.reserved_revision = None;
                self.failed_payment = None;
                cart.clear();

                let receipt = CheckoutReceipt {
                    order: order.clone(),
                    change: payment.change,
                };
                self.transition(CheckoutState::Completed {
                    order,
                    change: payment.change,
                });
                Ok(receipt)
            }
            Err(err) => {
                error!(order_id = %self.order_id, error = %err, "Settlement failed, cart kept for retry");
                let failure = CheckoutError::SettlementFailed {
                    order_id: self.order_id.clone(),
                    source: err,
                };
                self.transition(CheckoutState::Failed {
                    method: payment.method,
                    error: failure.notice(),
                });
                self.failed_payment = Some(payment);
                Err(failure)
            }
        }
    }

    /// Re-runs a failed settlement with the same order id and payment.
    pub async fn retry(&mut self, cart: &mut CartEngine) -> CheckoutResult<CheckoutReceipt> {
        let payment = match (&*self.state.borrow(), &self.failed_payment) {
            (CheckoutState::Failed { .. }, Some(payment)) => payment.clone(),
            (state, _) => {
                return Err(CheckoutError::InvalidTransition {
                    action: "retry settlement",
                    state: state.name(),
                })
            }
        };
        info!(order_id = %self.order_id, "Retrying settlement");
        self.settle(cart, payment).await
    }

    /// Leaves a failed settlement and goes back to editing the same cart.
    pub async fn return_to_cart(&mut self) -> CheckoutResult<()> {
        if !matches!(*self.state.borrow(), CheckoutState::Failed { .. }) {
            return Err(CheckoutError::InvalidTransition {
                action: "return to the cart",
                state: self.state_name(),
            });
        }
        let released = self.release_all().await;
        self.start_new_order();
        released.map(|_| ())
    }

    /// Cancels before settlement. Holds are released explicitly and the cart
    /// is emptied. Returns the number of holds released.
    pub async fn cancel(&mut self, cart: &mut CartEngine) -> CheckoutResult<usize> {
        let state = self.state.borrow().clone();
        if !state.is_cancellable() {
            return Err(CheckoutError::InvalidTransition {
                action: "cancel",
                state: state.name(),
            });
        }

        let released = self.release_all().await;
        cart.clear();
        self.transition(CheckoutState::Cancelled);
        released
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn transition(&self, next: CheckoutState) {
        info!(order_id = %self.order_id, from = self.state_name(), to = next.name(), "Checkout state change");
        self.state.send_replace(next);
    }

    fn start_new_order(&mut self) {
        self.order_id = Uuid::new_v4().to_string();
        self.reservations.clear();
        self.reserved_revision = None;
        self.failed_payment = None;
        self.transition(CheckoutState::Building);
    }

    async fn reserve_lines(&mut self, cart: &CartEngine) -> CheckoutResult<()> {
        for line in cart.cart().items() {
            let units = line.stock_units();
            if !line.track_inventory || units <= 0 {
                continue;
            }

            match self
                .client
                .reserve(line.item.clone(), units, &self.order_id, self.options.reservation_ttl)
                .await
            {
                Ok(reservation) => self.reservations.push(reservation),
                Err(source) => {
                    warn!(order_id = %self.order_id, item = %line.item, error = %source, "Reservation failed");
                    if let Err(err) = self.release_all().await {
                        warn!(order_id = %self.order_id, error = %err, "Partial holds could not all be released");
                    }
                    return Err(CheckoutError::ReservationFailed {
                        item: line.name.clone(),
                        source,
                    });
                }
            }
        }
        self.reserved_revision = Some(cart.cart().revision());
        info!(order_id = %self.order_id, holds = self.reservations.len(), "Stock reserved for checkout");
        Ok(())
    }

    async fn release_all(&mut self) -> CheckoutResult<usize> {
        let holds = std::mem::take(&mut self.reservations);
        self.reserved_revision = None;

        let mut released = 0;
        let mut first_failure = None;
        let mut failed = 0;

        for hold in holds {
            match self.client.release(&hold.id).await {
                Ok(_) => released += 1,
                Err(err) => {
                    warn!(reservation_id = %hold.id, error = %err, "Reservation release failed");
                    failed += 1;
                    first_failure.get_or_insert((hold.id, err));
                }
            }
        }

        match first_failure {
            None => Ok(released),
            Some((reservation_id, source)) => Err(CheckoutError::ReleaseFailed {
                reservation_id,
                failed,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::Arc;
    use tally_core::{CoreError, ItemKey, PricingMode, Product, ReservationStatus, TaxRate};
    use tally_db::{DbError, MemoryStore, StockStore, StoreOp};

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

    struct Fixture {
        store: MemoryStore,
        checkout: CheckoutOrchestrator,
        cart: CartEngine,
        milk: Product,
    }

    fn fixture(reserve: bool) -> Fixture {
        let milk = product("milk", 299, PricingMode::Unit);
        let store = MemoryStore::new()
            .with_product(milk.clone(), 10)
            .with_product(product("apples", 400, PricingMode::Weight), 5_000);
        let options = CheckoutOptions {
            store_id: "store-1".into(),
            reserve_on_checkout: reserve,
            reservation_ttl: Duration::minutes(15),
        };
        let checkout = CheckoutOrchestrator::new(StockReservationClient::new(Arc::new(store.clone())), options);
        Fixture {
            store,
            checkout,
            cart: CartEngine::new(TaxRate::from_bps(825)),
            milk,
        }
    }

    #[tokio::test]
    async fn test_cash_checkout_rejects_short_cash_then_settles_exact() {
        let mut f = fixture(true);
        f.cart.add_item(&f.milk, None).unwrap();
        f.cart.add_item(&f.milk, None).unwrap();

        let step = f.checkout.select_payment(PaymentMethod::Cash, &mut f.cart).await.unwrap();
        let due = Money::from_cents(647);
        assert_eq!(step, CheckoutStep::AwaitingCash { amount_due: due });
        assert_eq!(f.checkout.state(), CheckoutState::AwaitingCash { amount_due: due });

        let hold = f.checkout.reservations()[0].clone();
        assert_eq!(hold.quantity, 2);
        let level = f.store.stock_level(&ItemKey::product("milk")).await.unwrap();
        assert_eq!((level.on_hand, level.available), (10, 8));

        let err = f.checkout.confirm_cash(Money::from_cents(500), &mut f.cart).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Rejected(CoreError::InsufficientCash { .. })));
        assert_eq!(err.notice().code, ErrorCode::InsufficientCash);
        assert_eq!(f.checkout.state_name(), "awaiting_cash");
        assert_eq!(f.store.order_count(), 0);

        let receipt = f.checkout.confirm_cash(due, &mut f.cart).await.unwrap();
        assert_eq!(receipt.change, Some(Money::zero()));
        assert_eq!(receipt.order.total, due);
        assert_eq!(receipt.order.payment.tendered, Some(due));

        assert!(f.cart.is_empty());
        assert!(f.cart.calculation().is_none());
        assert_eq!(f.checkout.state_name(), "completed");
        assert_eq!(f.store.on_hand(&ItemKey::product("milk")), 8);
        assert_eq!(f.store.reservation(&hold.id).unwrap().status, ReservationStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_cash_change_is_exact() {
        let mut f = fixture(false);
        f.cart.add_item(&f.milk, None).unwrap();

        f.checkout.select_payment(PaymentMethod::Cash, &mut f.cart).await.unwrap();
        // 299 + 25 tax = 324
        let receipt = f.checkout.confirm_cash(Money::from_cents(1000), &mut f.cart).await.unwrap();
        assert_eq!(receipt.change, Some(Money::from_cents(676)));
    }

    #[tokio::test]
    async fn test_card_settles_immediately() {
        let mut f = fixture(true);
        let mut states = f.checkout.subscribe();
        f.cart.add_item(&f.milk, None).unwrap();

        let step = f
            .checkout
            .select_payment(PaymentMethod::ExternalCard, &mut f.cart)
            .await
            .unwrap();

        let CheckoutStep::Completed(receipt) = step else {
            panic!("card payment should settle");
        };
        assert_eq!(receipt.change, None);
        assert_eq!(receipt.order.payment.method, PaymentMethod::ExternalCard);
        assert!(states.has_changed().unwrap());
        assert_eq!(states.borrow_and_update().name(), "completed");
        assert!(f.cart.is_empty());
    }

    #[tokio::test]
    async fn test_failed_settlement_keeps_cart_and_retry_reuses_order_id() {
        let mut f = fixture(true);
        f.cart.add_item(&f.milk, None).unwrap();
        f.store.fail(StoreOp::Settle, DbError::Unavailable("gateway timeout".into()));

        let err = f
            .checkout
            .select_payment(PaymentMethod::ExternalCard, &mut f.cart)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::SettlementFailed { .. }));
        assert!(err.to_string().contains("gateway timeout"));

        match f.checkout.state() {
            CheckoutState::Failed { error, .. } => assert_eq!(error.code, ErrorCode::SettlementFailed),
            other => panic!("expected failed, got {other:?}"),
        }
        assert_eq!(f.cart.cart().len(), 1);
        assert!(f.cart.calculation().is_some());
        assert_eq!(f.store.on_hand(&ItemKey::product("milk")), 10);

        let order_id = f.checkout.order_id().to_string();
        assert!(f.checkout.cancel(&mut f.cart).await.is_err());

        f.store.clear_failures();
        let receipt = f.checkout.retry(&mut f.cart).await.unwrap();
        assert_eq!(receipt.order.id, order_id);
        assert_eq!(f.store.order_count(), 1);
        assert_eq!(f.store.on_hand(&ItemKey::product("milk")), 9);
    }

    #[tokio::test]
    async fn test_cancel_releases_holds_and_clears_cart() {
        let mut f = fixture(true);
        f.cart.add_item(&f.milk, None).unwrap();
        f.checkout.select_payment(PaymentMethod::Cash, &mut f.cart).await.unwrap();
        let hold = f.checkout.reservations()[0].id.clone();

        let released = f.checkout.cancel(&mut f.cart).await.unwrap();

        assert_eq!(released, 1);
        assert_eq!(f.checkout.state(), CheckoutState::Cancelled);
        assert!(f.cart.is_empty());
        assert_eq!(f.store.reservation(&hold).unwrap().status, ReservationStatus::Released);
        assert!(!f.store.calls().contains(&StoreOp::Settle));
    }

    #[tokio::test]
    async fn test_cancel_surfaces_release_failure() {
        let mut f = fixture(true);
        f.cart.add_item(&f.milk, None).unwrap();
        f.checkout.select_payment(PaymentMethod::Cash, &mut f.cart).await.unwrap();
        f.store.fail(StoreOp::Release, DbError::Unavailable("offline".into()));

        let err = f.checkout.cancel(&mut f.cart).await.unwrap_err();
        assert!(matches!(err, CheckoutError::ReleaseFailed { failed: 1, .. }));
        assert_eq!(f.checkout.state(), CheckoutState::Cancelled);
    }

    #[tokio::test]
    async fn test_unsettleable_carts_are_rejected_locally() {
        let mut f = fixture(true);

        let err = f
            .checkout
            .select_payment(PaymentMethod::Cash, &mut f.cart)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Rejected(CoreError::EmptyCart)));

        let apples = product("apples", 400, PricingMode::Weight);
        f.cart.add_item(&apples, None).unwrap();
        let err = f
            .checkout
            .select_payment(PaymentMethod::Cash, &mut f.cart)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Rejected(CoreError::UnpricedLine(_))));

        assert!(f.store.calls().is_empty());
        assert_eq!(f.checkout.state_name(), "building");
    }

    #[tokio::test]
    async fn test_reservation_failure_stays_building() {
        let mut f = fixture(true);
        f.store.set_on_hand(ItemKey::product("milk"), 1);
        f.cart.add_item(&f.milk, None).unwrap();
        f.cart.add_item(&f.milk, None).unwrap();

        let err = f
            .checkout
            .select_payment(PaymentMethod::Cash, &mut f.cart)
            .await
            .unwrap_err();
        assert_eq!(err.notice().code, ErrorCode::InsufficientStock);
        assert_eq!(f.checkout.state_name(), "building");
        assert!(f.checkout.reservations().is_empty());
    }

    #[tokio::test]
    async fn test_switching_method_keeps_existing_holds() {
        let mut f = fixture(true);
        f.cart.add_item(&f.milk, None).unwrap();

        f.checkout.select_payment(PaymentMethod::Cash, &mut f.cart).await.unwrap();
        f.checkout
            .select_payment(PaymentMethod::ExternalCard, &mut f.cart)
            .await
            .unwrap();

        let reserves = f.store.calls().iter().filter(|op| **op == StoreOp::Reserve).count();
        assert_eq!(reserves, 1);
    }

    #[tokio::test]
    async fn test_state_predicates_follow_transitions() {
        let mut f = fixture(false);
        assert!(f.checkout.is_building());
        assert!(!f.checkout.is_finished());

        f.cart.add_item(&f.milk, None).unwrap();
        f.checkout.select_payment(PaymentMethod::Cash, &mut f.cart).await.unwrap();
        assert!(!f.checkout.is_building());
        assert!(!f.checkout.is_finished());
        assert!(f.checkout.return_to_cart().await.is_err());

        f.checkout.cancel(&mut f.cart).await.unwrap();
        assert!(f.checkout.is_cancelled());
        assert!(f.checkout.is_finished());
        assert!(f.checkout.select_payment(PaymentMethod::Cash, &mut f.cart).await.is_err());

        f.checkout.begin_editing().unwrap();
        assert!(f.checkout.is_building());
    }

    #[tokio::test]
    async fn test_editing_after_completion_starts_new_order() {
        let mut f = fixture(false);
        f.cart.add_item(&f.milk, None).unwrap();
        f.checkout
            .select_payment(PaymentMethod::ExternalCard, &mut f.cart)
            .await
            .unwrap();
        let first = f.checkout.order_id().to_string();

        f.checkout.begin_editing().unwrap();
        assert_eq!(f.checkout.state(), CheckoutState::Building);
        assert_ne!(f.checkout.order_id(), first);
        assert!(!f.store.calls().contains(&StoreOp::Reserve));
    }

    #[tokio::test]
    async fn test_editing_blocked_during_payment() {
        let mut f = fixture(false);
        f.cart.add_item(&f.milk, None).unwrap();
        f.checkout.select_payment(PaymentMethod::Cash, &mut f.cart).await.unwrap();

        assert!(matches!(
            f.checkout.begin_editing(),
            Err(CheckoutError::InvalidTransition { state: "awaiting_cash", .. })
        ));
        assert!(f.checkout.confirm_cash(Money::from_cents(100), &mut f.cart).await.is_err());
    }
}
