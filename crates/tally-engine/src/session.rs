//! # Terminal Session
//!
//! One checkout lane: the cart, at most one numpad capture, the checkout
//! state machine, and the customer display feed.
//!
//! ## Numpad Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  add_product(weighed) ──► open Weight capture on the placeholder line   │
//! │  select_payment(cash) ──► open Cash capture                             │
//! │                                                                         │
//! │  commit_numpad()                                                        │
//! │    ├── Quantity(q) ──► CartEngine::update_item(target, quantity)        │
//! │    ├── Weight(w)   ──► CartEngine::update_item(target, weight)          │
//! │    ├── Price(p)    ──► CartEngine::update_item(target, unit_price)      │
//! │    └── Cash(m)     ──► CheckoutOrchestrator::confirm_cash(m)            │
//! │                                                                         │
//! │  A rejected commit reopens the same capture for another try.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Display Feed
//! - cart changed, lines left ──► `cart_update` (full snapshot)
//! - cart emptied or cancelled ──► `cart_cleared`
//! - payment selected ──► `payment_started`
//! - order settled ──► `order_completed` (the display clears itself after the dwell)

use std::sync::Arc;

use tally_core::calculation::ensure_settleable;
use tally_core::cart::{AddOutcome, UpdateOutcome};
use tally_core::numpad::NumpadKey;
use tally_core::{LineItem, LineUpdate, Money, NumpadMode, NumpadSession, NumpadValue, PaymentMethod, Product};
use tally_db::{DbError, StockStore};
use tally_display::DisplayPublisher;
use tracing::{debug, info};

use crate::cart_engine::CartEngine;
use crate::checkout::{CheckoutOptions, CheckoutOrchestrator, CheckoutReceipt, CheckoutState, CheckoutStep};
use crate::config::TerminalConfig;
use crate::error::{CheckoutError, EngineError, EngineResult};
use crate::reservation::StockReservationClient;

/// What a numpad commit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumpadOutcome {
    CartUpdated(UpdateOutcome),
    Paid(CheckoutReceipt),
}

#[derive(Debug)]
pub struct TerminalSession {
    cart: CartEngine,
    checkout: CheckoutOrchestrator,
    client: StockReservationClient,
    numpad: Option<NumpadSession>,
    publisher: DisplayPublisher,
    dwell_ms: u64,
}

impl TerminalSession {
    pub fn new(
        cart: CartEngine,
        checkout: CheckoutOrchestrator,
        client: StockReservationClient,
        publisher: DisplayPublisher,
        dwell_ms: u64,
    ) -> Self {
        TerminalSession {
            cart,
            checkout,
            client,
            numpad: None,
            publisher,
            dwell_ms,
        }
    }

    pub fn from_config(config: &TerminalConfig, store: Arc<dyn StockStore>, publisher: DisplayPublisher) -> Self {
        let client = StockReservationClient::new(store);
        let checkout = CheckoutOrchestrator::new(client.clone(), CheckoutOptions::from_config(config));
        Self::new(
            CartEngine::new(config.tax_rate()),
            checkout,
            client,
            publisher,
            config.display.dwell_ms,
        )
    }

    pub fn cart(&self) -> &CartEngine {
        &self.cart
    }

    pub fn checkout(&self) -> &CheckoutOrchestrator {
        &self.checkout
    }

    pub fn client(&self) -> &StockReservationClient {
        &self.client
    }

    pub fn publisher(&self) -> &DisplayPublisher {
        &self.publisher
    }

    /// The open capture, if any.
    pub fn numpad(&self) -> Option<&NumpadSession> {
        self.numpad.as_ref().filter(|n| n.is_capturing())
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Adds a product. Weighed and open-priced products open a capture for
    /// their placeholder line.
    pub fn add_product(&mut self, product: &Product, variant_id: Option<&str>) -> EngineResult<AddOutcome> {
        self.ensure_editable()?;
        self.ensure_no_capture()?;

        let before = self.cart.cart().revision();
        let outcome = self.cart.add_item(product, variant_id)?;

        if let Some(capture) = &outcome.capture {
            self.numpad = Some(NumpadSession::begin(capture.mode, Some(capture.item_id.clone())));
        }
        if self.cart.cart().revision() != before {
            self.publish_cart();
        }
        Ok(outcome)
    }

    /// Looks a product up on the store and adds it.
    pub async fn scan(&mut self, product_id: &str, variant_id: Option<&str>) -> EngineResult<AddOutcome> {
        self.ensure_editable()?;
        let product = self
            .client
            .find_product(product_id)
            .await?
            .ok_or_else(|| DbError::not_found("product", product_id))?;
        self.add_product(&product, variant_id)
    }

    pub fn update_item(&mut self, item_id: &str, update: LineUpdate) -> EngineResult<UpdateOutcome> {
        self.ensure_editable()?;
        let outcome = self.cart.update_item(item_id, update)?;
        self.publish_cart();
        Ok(outcome)
    }

    pub fn remove_item(&mut self, item_id: &str) -> EngineResult<LineItem> {
        self.ensure_editable()?;
        let line = self.cart.remove_item(item_id)?;
        if self.numpad().and_then(|n| n.target()) == Some(item_id) {
            self.numpad = None;
        }
        self.publish_cart();
        Ok(line)
    }

    pub fn clear_cart(&mut self) -> EngineResult<()> {
        self.ensure_editable()?;
        self.cart.clear();
        self.numpad = None;
        self.publish_cart();
        Ok(())
    }

    // =========================================================================
    // Numpad
    // =========================================================================

    /// Opens a capture. Line modes need a target line; cash needs a checkout
    /// waiting for cash.
    pub fn open_numpad(&mut self, mode: NumpadMode, target: Option<String>) -> EngineResult<()> {
        self.ensure_no_capture()?;

        match mode {
            NumpadMode::Cash => {
                if !matches!(self.checkout.state(), CheckoutState::AwaitingCash { .. }) {
                    return Err(CheckoutError::InvalidTransition {
                        action: "enter cash",
                        state: self.checkout.state_name(),
                    }
                    .into());
                }
            }
            NumpadMode::Quantity | NumpadMode::Weight | NumpadMode::Price => {
                self.ensure_editable()?;
                let item_id = target.as_deref().ok_or(EngineError::CaptureTargetMissing(mode))?;
                if self.cart.cart().get(item_id).is_none() {
                    return Err(tally_core::CoreError::ItemNotFound(item_id.to_string()).into());
                }
            }
        }

        debug!(%mode, target = ?target, "Numpad capture opened");
        self.numpad = Some(NumpadSession::begin(mode, target));
        Ok(())
    }

    /// Returns `false` when the key was ignored.
    pub fn press_key(&mut self, key: NumpadKey) -> EngineResult<bool> {
        match self.numpad.as_mut().filter(|n| n.is_capturing()) {
            Some(numpad) => Ok(numpad.press(key)),
            None => Err(EngineError::NoActiveCapture),
        }
    }

    /// Abandons the open capture with no side effects.
    pub fn cancel_numpad(&mut self) -> EngineResult<()> {
        let mut numpad = self.numpad.take().ok_or(EngineError::NoActiveCapture)?;
        if !numpad.cancel() {
            return Err(EngineError::NoActiveCapture);
        }
        debug!("Numpad capture cancelled");
        Ok(())
    }

    /// Commits the open capture and routes its value.
    pub async fn commit_numpad(&mut self) -> EngineResult<NumpadOutcome> {
        let mut numpad = self.numpad.take().ok_or(EngineError::NoActiveCapture)?;
        let commit = numpad.commit().ok_or(EngineError::NoActiveCapture)?;
        let mode = commit.value.mode();
        debug!(%mode, value = ?commit.value, "Numpad committed");

        let result = match commit.value {
            NumpadValue::Cash(received) => self.confirm_cash(received).await.map(NumpadOutcome::Paid),
            line_value => {
                let item_id = commit.target.as_deref().ok_or(EngineError::CaptureTargetMissing(mode));
                match item_id {
                    Ok(item_id) => {
                        let update = match line_value {
                            NumpadValue::Quantity(q) => LineUpdate::quantity(q),
                            NumpadValue::Weight(w) => LineUpdate::weight(w),
                            NumpadValue::Price(p) | NumpadValue::Cash(p) => LineUpdate::unit_price(p),
                        };
                        self.update_item(item_id, update).map(NumpadOutcome::CartUpdated)
                    }
                    Err(err) => Err(err),
                }
            }
        };

        if result.is_err() && self.capture_still_applies(mode, commit.target.as_deref()) {
            self.numpad = Some(NumpadSession::begin(mode, commit.target));
        }
        result
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    pub async fn select_payment(&mut self, method: PaymentMethod) -> EngineResult<CheckoutStep> {
        if self.checkout.is_finished() {
            self.checkout.begin_editing()?;
        }
        if let Some(numpad) = self.numpad() {
            if numpad.mode() != Some(NumpadMode::Cash) {
                return Err(EngineError::CaptureInProgress(numpad.mode().unwrap_or(NumpadMode::Cash)));
            }
        }

        let amount_due = ensure_settleable(self.cart.cart(), self.cart.calculation())
            .map_err(CheckoutError::from)?
            .total;
        self.numpad = None;
        self.publisher.payment_started(method, amount_due);

        match self.checkout.select_payment(method, &mut self.cart).await {
            Ok(CheckoutStep::AwaitingCash { amount_due }) => {
                self.numpad = Some(NumpadSession::begin(NumpadMode::Cash, None));
                Ok(CheckoutStep::AwaitingCash { amount_due })
            }
            Ok(CheckoutStep::Completed(receipt)) => {
                self.publish_completed(&receipt);
                Ok(CheckoutStep::Completed(receipt))
            }
            Err(err) => {
                if self.checkout.is_building() {
                    self.publish_cart();
                }
                Err(err.into())
            }
        }
    }

    pub async fn confirm_cash(&mut self, received: Money) -> EngineResult<CheckoutReceipt> {
        let receipt = self.checkout.confirm_cash(received, &mut self.cart).await?;
        self.publish_completed(&receipt);
        Ok(receipt)
    }

    /// Cancels before settlement: holds released, cart emptied.
    pub async fn cancel_checkout(&mut self) -> EngineResult<usize> {
        let already_cancelled = self.checkout.is_cancelled();
        let result = self.checkout.cancel(&mut self.cart).await;
        if !already_cancelled && self.checkout.is_cancelled() {
            // The capture only goes once the cancel went through.
            self.numpad = None;
            info!(order_id = %self.checkout.order_id(), "Checkout cancelled");
            self.publisher.cart_cleared();
        }
        Ok(result?)
    }

    pub async fn retry_settlement(&mut self) -> EngineResult<CheckoutReceipt> {
        let receipt = self.checkout.retry(&mut self.cart).await?;
        self.publish_completed(&receipt);
        Ok(receipt)
    }

    pub async fn return_to_cart(&mut self) -> EngineResult<()> {
        let result = self.checkout.return_to_cart().await;
        if self.checkout.is_building() {
            self.publish_cart();
        }
        Ok(result?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_editable(&mut self) -> EngineResult<()> {
        self.checkout
            .begin_editing()
            .map_err(|_| EngineError::CartLocked(self.checkout.state_name()))
    }

    fn ensure_no_capture(&self) -> EngineResult<()> {
        match self.numpad().and_then(|n| n.mode()) {
            Some(mode) => Err(EngineError::CaptureInProgress(mode)),
            None => Ok(()),
        }
    }

    fn capture_still_applies(&self, mode: NumpadMode, target: Option<&str>) -> bool {
        match mode {
            NumpadMode::Cash => matches!(self.checkout.state(), CheckoutState::AwaitingCash { .. }),
            _ => target.is_some_and(|id| self.cart.cart().get(id).is_some()),
        }
    }

    fn publish_cart(&self) {
        match self.cart.calculation() {
            Some(calculation) if !self.cart.is_empty() => self.publisher.cart_update(self.cart.cart(), calculation),
            _ => self.publisher.cart_cleared(),
        };
    }

    fn publish_completed(&mut self, receipt: &CheckoutReceipt) {
        self.numpad = None;
        self.publisher
            .order_completed(receipt.order.clone(), receipt.change, self.dwell_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Duration;
    use tally_core::{CoreError, ItemKey, PricingMode, Quantity, ReservationStatus, TaxRate};
    use tally_db::{MemoryStore, StoreOp};
    use tally_display::DisplayEvent;
    use tokio::sync::broadcast;

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

    fn session() -> (TerminalSession, MemoryStore, broadcast::Receiver<tally_display::DisplayEnvelope>) {
        let store = MemoryStore::new()
            .with_product(product("milk", 299, PricingMode::Unit), 10)
            .with_product(product("apples", 400, PricingMode::Weight), 5_000)
            .with_product(product("deli", 0, PricingMode::Open), 0);
        let client = StockReservationClient::new(Arc::new(store.clone()));
        let checkout = CheckoutOrchestrator::new(
            client.clone(),
            CheckoutOptions {
                store_id: "store-1".into(),
                reserve_on_checkout: true,
                reservation_ttl: Duration::minutes(15),
            },
        );
        let publisher = DisplayPublisher::with_source("terminal-test");
        let events = publisher.subscribe();
        let session = TerminalSession::new(
            CartEngine::new(TaxRate::from_bps(825)),
            checkout,
            client,
            publisher,
            5_000,
        );
        (session, store, events)
    }

    fn kinds(events: &mut broadcast::Receiver<tally_display::DisplayEnvelope>) -> Vec<String> {
        let mut kinds = Vec::new();
        while let Ok(envelope) = events.try_recv() {
            kinds.push(envelope.kind);
        }
        kinds
    }

    fn press_all(session: &mut TerminalSession, keys: &str) {
        for c in keys.chars() {
            let key = match c {
                '.' => NumpadKey::Decimal,
                d => NumpadKey::Digit(d.to_digit(10).unwrap() as u8),
            };
            session.press_key(key).unwrap();
        }
    }

    #[tokio::test]
    async fn test_scan_adds_and_publishes_snapshot() {
        let (mut session, _, mut events) = session();

        session.scan("milk", None).await.unwrap();
        session.scan("milk", None).await.unwrap();

        assert_eq!(session.cart().cart().items()[0].quantity, Quantity::units(2));
        assert_eq!(kinds(&mut events), vec![DisplayEvent::CART_UPDATE, DisplayEvent::CART_UPDATE]);

        let err = session.scan("nope", None).await.unwrap_err();
        assert_eq!(err.notice().code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_weighed_item_captures_weight() {
        let (mut session, _, _) = session();
        session.scan("apples", None).await.unwrap();

        let numpad = session.numpad().unwrap();
        assert_eq!(numpad.mode(), Some(NumpadMode::Weight));
        assert_eq!(numpad.target(), Some("apples"));

        press_all(&mut session, "1.25");
        let outcome = session.commit_numpad().await.unwrap();

        assert_eq!(outcome, NumpadOutcome::CartUpdated(UpdateOutcome::Updated));
        assert!(session.numpad().is_none());
        assert_eq!(session.cart().cart().items()[0].total_price.cents(), 500);
    }

    #[tokio::test]
    async fn test_second_capture_is_rejected() {
        let (mut session, _, _) = session();
        session.scan("apples", None).await.unwrap();

        let err = session.scan("milk", None).await.unwrap_err();
        assert!(matches!(err, EngineError::CaptureInProgress(NumpadMode::Weight)));
        let err = session.open_numpad(NumpadMode::Quantity, Some("apples".into())).unwrap_err();
        assert!(matches!(err, EngineError::CaptureInProgress(_)));

        session.cancel_numpad().unwrap();
        assert!(session.numpad().is_none());
        assert!(matches!(session.cancel_numpad(), Err(EngineError::NoActiveCapture)));
    }

    #[tokio::test]
    async fn test_quantity_and_price_captures_route_to_cart() {
        let (mut session, _, _) = session();
        session.scan("milk", None).await.unwrap();

        session.open_numpad(NumpadMode::Quantity, Some("milk".into())).unwrap();
        press_all(&mut session, "3");
        session.commit_numpad().await.unwrap();
        assert_eq!(session.cart().cart().get("milk").unwrap().quantity, Quantity::units(3));

        session.scan("deli", None).await.unwrap();
        assert_eq!(session.numpad().unwrap().mode(), Some(NumpadMode::Price));
        press_all(&mut session, "4.5");
        session.commit_numpad().await.unwrap();
        assert_eq!(session.cart().cart().get("deli").unwrap().total_price.cents(), 450);

        assert!(matches!(
            session.open_numpad(NumpadMode::Quantity, None),
            Err(EngineError::CaptureTargetMissing(NumpadMode::Quantity))
        ));
    }

    #[tokio::test]
    async fn test_cash_payment_flow_and_display_sequence() {
        let (mut session, store, mut events) = session();
        session.scan("milk", None).await.unwrap();

        let step = session.select_payment(PaymentMethod::Cash).await.unwrap();
        assert_eq!(step, CheckoutStep::AwaitingCash { amount_due: Money::from_cents(324) });
        assert_eq!(session.numpad().unwrap().mode(), Some(NumpadMode::Cash));

        // Cart is locked while waiting for cash.
        assert!(matches!(session.scan("milk", None).await, Err(EngineError::CartLocked("awaiting_cash"))));

        press_all(&mut session, "3");
        let err = session.commit_numpad().await.unwrap_err();
        assert_eq!(err.notice().code, ErrorCode::InsufficientCash);
        assert_eq!(session.numpad().unwrap().mode(), Some(NumpadMode::Cash));

        press_all(&mut session, "5");
        let NumpadOutcome::Paid(receipt) = session.commit_numpad().await.unwrap() else {
            panic!("cash commit should settle");
        };
        assert_eq!(receipt.change, Some(Money::from_cents(176)));
        assert!(session.cart().is_empty());
        assert!(session.numpad().is_none());
        assert_eq!(store.on_hand(&ItemKey::product("milk")), 9);

        assert_eq!(
            kinds(&mut events),
            vec![
                DisplayEvent::CART_UPDATE,
                DisplayEvent::PAYMENT_STARTED,
                DisplayEvent::ORDER_COMPLETED,
            ]
        );

        // Next customer starts a fresh order.
        let finished = session.checkout().order_id().to_string();
        session.scan("milk", None).await.unwrap();
        assert_ne!(session.checkout().order_id(), finished);
    }

    #[tokio::test]
    async fn test_cancel_checkout_releases_and_clears_display() {
        let (mut session, store, mut events) = session();
        session.scan("milk", None).await.unwrap();
        session.select_payment(PaymentMethod::Cash).await.unwrap();
        let hold = session.checkout().reservations()[0].id.clone();

        assert_eq!(session.cancel_checkout().await.unwrap(), 1);

        assert!(session.cart().is_empty());
        assert!(session.numpad().is_none());
        assert_eq!(store.reservation(&hold).unwrap().status, ReservationStatus::Released);
        assert_eq!(kinds(&mut events).last().map(String::as_str), Some(DisplayEvent::CART_CLEARED));
    }

    #[tokio::test]
    async fn test_removing_last_line_clears_display() {
        let (mut session, _, mut events) = session();
        session.scan("milk", None).await.unwrap();
        session.remove_item("milk").unwrap();

        assert_eq!(kinds(&mut events), vec![DisplayEvent::CART_UPDATE, DisplayEvent::CART_CLEARED]);
        assert!(matches!(
            session.remove_item("milk"),
            Err(EngineError::Core(CoreError::ItemNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_failed_card_settlement_can_be_retried() {
        let (mut session, store, _) = session();
        session.scan("milk", None).await.unwrap();
        store.fail(StoreOp::Settle, DbError::Unavailable("offline".into()));

        let err = session.select_payment(PaymentMethod::ExternalCard).await.unwrap_err();
        assert_eq!(err.notice().code, ErrorCode::SettlementFailed);
        assert_eq!(session.cart().cart().len(), 1);
        assert!(matches!(session.clear_cart(), Err(EngineError::CartLocked("failed"))));

        store.clear_failures();
        let receipt = session.retry_settlement().await.unwrap();
        assert_eq!(receipt.order.lines.len(), 1);
        assert!(session.cart().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_cancel_keeps_open_capture() {
        let (mut session, store, mut events) = session();
        session.scan("milk", None).await.unwrap();
        store.fail(StoreOp::Settle, DbError::Unavailable("offline".into()));
        session.select_payment(PaymentMethod::ExternalCard).await.unwrap_err();
        kinds(&mut events);
        session.numpad = Some(NumpadSession::begin(NumpadMode::Quantity, Some("milk".into())));

        let err = session.cancel_checkout().await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::Checkout(CheckoutError::InvalidTransition { state: "failed", .. })
        ));
        assert_eq!(session.numpad().unwrap().mode(), Some(NumpadMode::Quantity));
        assert_eq!(session.cart().cart().len(), 1);
        assert!(kinds(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_return_to_cart_after_failure_keeps_lines() {
        let (mut session, store, mut events) = session();
        session.scan("milk", None).await.unwrap();
        store.fail(StoreOp::Settle, DbError::Unavailable("offline".into()));
        session.select_payment(PaymentMethod::ExternalCard).await.unwrap_err();
        let failed_order = session.checkout().order_id().to_string();

        session.return_to_cart().await.unwrap();

        assert_eq!(session.checkout().state(), CheckoutState::Building);
        assert_ne!(session.checkout().order_id(), failed_order);
        assert_eq!(session.cart().cart().len(), 1);
        assert_eq!(kinds(&mut events).last().map(String::as_str), Some(DisplayEvent::CART_UPDATE));
        session.scan("milk", None).await.unwrap();
    }
}
