//! # Display Subscriber
//!
//! Folds the event stream into the one view a customer display shows.
//!
//! ## View States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────┐  cart_update   ┌──────────┐  payment_started ┌────────────┐ │
//! │   │ Idle │ ─────────────► │ Building │ ───────────────► │ Payment    │ │
//! │   └──────┘                └──────────┘                  │ Pending    │ │
//! │     ▲  ▲                                                └─────┬──────┘ │
//! │     │  │ cart_cleared (from any state)                        │        │
//! │     │  └──────────────────────────────────            order_completed  │
//! │     │                                                         ▼        │
//! │     │            dwell elapsed (no input needed)      ┌────────────┐   │
//! │     └──────────────────────────────────────────────── │ Completed  │   │
//! │                                                       └────────────┘   │
//! │                                                                         │
//! │  Every event REPLACES the view; nothing is merged. Any event type may  │
//! │  arrive in any state, so a display that missed updates still lands    │
//! │  on the right screen.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//! Events from one source apply only in increasing `seq` order; a repeat or
//! an older event is dropped. A new source (terminal restart) resets the
//! sequence.
//!
//! ## Dwell
//! The completed screen is held for `dwell_ms` counted from the event's
//! `timestamp`, not from arrival. A replayed sale whose dwell already ran
//! out folds straight to idle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::protocol::{CartSnapshot, DisplayEnvelope, DisplayEvent, OrderCompleted, PaymentStarted};

// =============================================================================
// View Model
// =============================================================================

/// What the customer display is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DisplayView {
    /// No active order.
    #[default]
    Idle,
    Building { cart: CartSnapshot },
    PaymentPending {
        /// Last cart seen, if any survived the trip.
        cart: Option<CartSnapshot>,
        payment: PaymentStarted,
    },
    Completed { completed: OrderCompleted },
}

impl DisplayView {
    pub fn name(&self) -> &'static str {
        match self {
            DisplayView::Idle => "idle",
            DisplayView::Building { .. } => "building",
            DisplayView::PaymentPending { .. } => "payment_pending",
            DisplayView::Completed { .. } => "completed",
        }
    }
}

/// What happened to one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Same source, `seq` not newer than the last applied one.
    Stale,
    /// Unknown `type`; skipped.
    Ignored,
    /// Known `type`, payload did not decode.
    Malformed,
}

// =============================================================================
// Subscriber
// =============================================================================

/// Single-owner view model with a dwell timer.
///
/// ## Usage
/// ```rust,ignore
/// let (subscriber, mut view_rx) = DisplaySubscriber::new(Duration::from_secs(5));
/// tokio::spawn(subscriber.run(incoming_rx));
///
/// while view_rx.changed().await.is_ok() {
///     render(&view_rx.borrow());
/// }
/// ```
#[derive(Debug)]
pub struct DisplaySubscriber {
    view_tx: watch::Sender<DisplayView>,
    last_source: Option<String>,
    last_seq: u64,
    dwell_deadline: Option<Instant>,
    default_dwell: Duration,
}

impl DisplaySubscriber {
    /// `default_dwell` applies when an `order_completed` carries no dwell.
    pub fn new(default_dwell: Duration) -> (Self, watch::Receiver<DisplayView>) {
        let (view_tx, view_rx) = watch::channel(DisplayView::Idle);
        let subscriber = DisplaySubscriber {
            view_tx,
            last_source: None,
            last_seq: 0,
            dwell_deadline: None,
            default_dwell,
        };
        (subscriber, view_rx)
    }

    pub fn view(&self) -> DisplayView {
        self.view_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DisplayView> {
        self.view_tx.subscribe()
    }

    /// When the completed screen reverts to idle, if one is showing.
    pub fn dwell_deadline(&self) -> Option<Instant> {
        self.dwell_deadline
    }

    /// Applies one envelope to the view.
    pub fn apply(&mut self, envelope: &DisplayEnvelope) -> ApplyOutcome {
        if self.last_source.as_deref() == Some(envelope.source.as_str()) && envelope.seq <= self.last_seq {
            debug!(
                kind = %envelope.kind,
                seq = envelope.seq,
                last_seq = self.last_seq,
                "Dropping stale display event"
            );
            return ApplyOutcome::Stale;
        }

        let event = match envelope.decode() {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(kind = %envelope.kind, "Ignoring unknown display event type");
                self.advance(envelope);
                return ApplyOutcome::Ignored;
            }
            Err(e) => {
                warn!(kind = %envelope.kind, seq = envelope.seq, error = %e, "Malformed display event");
                return ApplyOutcome::Malformed;
            }
        };

        self.advance(envelope);
        self.fold(event, envelope.timestamp, Utc::now());
        ApplyOutcome::Applied
    }

    fn advance(&mut self, envelope: &DisplayEnvelope) {
        if self.last_source.as_deref() != Some(envelope.source.as_str()) {
            info!(source = %envelope.source, "Display following new source");
            self.last_source = Some(envelope.source.clone());
        }
        self.last_seq = envelope.seq;
    }

    fn fold(&mut self, event: DisplayEvent, sent_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.dwell_deadline = None;

        let next = match event {
            DisplayEvent::CartUpdate(cart) => DisplayView::Building { cart },
            DisplayEvent::PaymentStarted(payment) => {
                let cart = match &*self.view_tx.borrow() {
                    DisplayView::Building { cart } => Some(cart.clone()),
                    DisplayView::PaymentPending { cart, .. } => cart.clone(),
                    _ => None,
                };
                DisplayView::PaymentPending { cart, payment }
            }
            DisplayEvent::OrderCompleted(completed) => {
                let dwell = match completed.dwell_ms {
                    0 => self.default_dwell,
                    ms => Duration::from_millis(ms),
                };
                // Clock skew can put `sent_at` ahead of us; count that as no time elapsed.
                let elapsed = (now - sent_at).to_std().unwrap_or(Duration::ZERO);
                match dwell.checked_sub(elapsed) {
                    Some(remaining) if !remaining.is_zero() => {
                        self.dwell_deadline = Some(Instant::now() + remaining);
                        DisplayView::Completed { completed }
                    }
                    _ => {
                        debug!(
                            order_id = %completed.order.id,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Completed order past its dwell, showing idle"
                        );
                        DisplayView::Idle
                    }
                }
            }
            DisplayEvent::CartCleared => DisplayView::Idle,
        };

        debug!(view = next.name(), "Display view replaced");
        self.view_tx.send_replace(next);
    }

    /// Reverts a completed screen to idle once its dwell has elapsed.
    ///
    /// Returns true if the view changed.
    pub fn expire_dwell(&mut self, now: Instant) -> bool {
        match self.dwell_deadline {
            Some(deadline) if now >= deadline => {
                self.dwell_deadline = None;
                debug!("Dwell elapsed, display back to idle");
                self.view_tx.send_replace(DisplayView::Idle);
                true
            }
            _ => false,
        }
    }

    /// Consumes envelopes until the channel closes, running the dwell timer
    /// in between.
    pub async fn run(mut self, mut incoming: mpsc::Receiver<DisplayEnvelope>) {
        loop {
            let deadline = self.dwell_deadline;
            tokio::select! {
                received = incoming.recv() => match received {
                    Some(envelope) => {
                        self.apply(&envelope);
                    }
                    None => break,
                },
                _ = wait_for(deadline) => {
                    self.expire_dwell(Instant::now());
                }
            }
        }
        debug!("Display subscriber stopped");
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_DWELL_MS;
    use chrono::Utc;
    use serde_json::json;
    use tally_core::{
        calculation::calculate, Cart, Money, Order, PaymentMethod, PaymentRecord, PricingMode, Product, TaxRate,
    };

    fn product(id: &str, cents: i64) -> Product {
        Product {
            id: id.into(),
            sku: id.to_uppercase(),
            name: id.into(),
            price_cents: cents,
            pricing_mode: PricingMode::Unit,
            variants: vec![],
            track_inventory: true,
            is_active: true,
        }
    }

    fn snapshot(cart: &Cart) -> DisplayEvent {
        let calc = calculate(cart, TaxRate::from_bps(825)).unwrap();
        DisplayEvent::CartUpdate(CartSnapshot::capture(cart, &calc))
    }

    fn order(total: i64) -> Order {
        Order {
            id: "o-1".into(),
            receipt_number: "20260101-S1-000001".into(),
            store_id: "s-1".into(),
            lines: vec![],
            subtotal: Money::from_cents(total),
            tax: Money::zero(),
            tax_rate: TaxRate::zero(),
            total: Money::from_cents(total),
            payment: PaymentRecord {
                method: PaymentMethod::ExternalCard,
                amount: Money::from_cents(total),
                tendered: None,
                change: None,
            },
            created_at: Utc::now(),
        }
    }

    fn completed(dwell_ms: u64) -> DisplayEvent {
        DisplayEvent::OrderCompleted(OrderCompleted {
            order: order(1190),
            change: None,
            dwell_ms,
        })
    }

    fn env(event: DisplayEvent, seq: u64) -> DisplayEnvelope {
        event.into_envelope(seq, "t-1", Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_dropped_updates_still_end_completed() {
        let (mut sub, _rx) = DisplaySubscriber::new(Duration::from_millis(DEFAULT_DWELL_MS));
        let mut cart = Cart::new();
        cart.add_item(&product("cola", 150), None).unwrap();
        let cart1 = env(snapshot(&cart), 1);
        cart.add_item(&product("chips", 249), None).unwrap();
        let _cart2_dropped = env(snapshot(&cart), 2);

        assert_eq!(sub.apply(&cart1), ApplyOutcome::Applied);
        assert_eq!(sub.apply(&env(completed(DEFAULT_DWELL_MS), 3)), ApplyOutcome::Applied);

        match sub.view() {
            DisplayView::Completed { completed } => assert_eq!(completed.order.id, "o-1"),
            other => panic!("expected completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_completed_without_any_prior_event() {
        let (mut sub, _rx) = DisplaySubscriber::new(Duration::from_millis(DEFAULT_DWELL_MS));
        sub.apply(&env(completed(DEFAULT_DWELL_MS), 9));
        assert_eq!(sub.view().name(), "completed");
    }

    #[tokio::test]
    async fn test_stale_and_duplicate_events_dropped() {
        let (mut sub, _rx) = DisplaySubscriber::new(Duration::from_secs(5));
        let mut cart = Cart::new();
        cart.add_item(&product("cola", 150), None).unwrap();

        assert_eq!(sub.apply(&env(completed(5000), 5)), ApplyOutcome::Applied);
        assert_eq!(sub.apply(&env(snapshot(&cart), 4)), ApplyOutcome::Stale);
        assert_eq!(sub.apply(&env(completed(5000), 5)), ApplyOutcome::Stale);
        assert_eq!(sub.view().name(), "completed");

        // A restarted terminal starts over at seq 1
        let restarted = snapshot(&cart).into_envelope(1, "t-2", Utc::now()).unwrap();
        assert_eq!(sub.apply(&restarted), ApplyOutcome::Applied);
        assert_eq!(sub.view().name(), "building");
    }

    #[tokio::test]
    async fn test_unknown_type_ignored_view_unchanged() {
        let (mut sub, _rx) = DisplaySubscriber::new(Duration::from_secs(5));
        let mut cart = Cart::new();
        cart.add_item(&product("cola", 150), None).unwrap();
        sub.apply(&env(snapshot(&cart), 1));

        let unknown = DisplayEnvelope {
            kind: "promo_banner".into(),
            payload: json!({ "text": "2 for 1" }),
            timestamp: Utc::now(),
            seq: 2,
            source: "t-1".into(),
        };
        assert_eq!(sub.apply(&unknown), ApplyOutcome::Ignored);
        assert_eq!(sub.view().name(), "building");
    }

    #[tokio::test]
    async fn test_payment_pending_keeps_last_cart() {
        let (mut sub, _rx) = DisplaySubscriber::new(Duration::from_secs(5));
        let mut cart = Cart::new();
        cart.add_item(&product("cola", 150), None).unwrap();
        sub.apply(&env(snapshot(&cart), 1));
        sub.apply(&env(
            DisplayEvent::PaymentStarted(PaymentStarted {
                method: PaymentMethod::Cash,
                amount_due: Money::from_cents(162),
            }),
            2,
        ));

        match sub.view() {
            DisplayView::PaymentPending { cart, payment } => {
                assert_eq!(cart.unwrap().items.len(), 1);
                assert_eq!(payment.amount_due.cents(), 162);
            }
            other => panic!("expected payment pending, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_auto_reverts_after_dwell() {
        let (sub, mut view_rx) = DisplaySubscriber::new(Duration::from_millis(DEFAULT_DWELL_MS));
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(sub.run(rx));

        tx.send(env(completed(DEFAULT_DWELL_MS), 1)).await.unwrap();
        view_rx.changed().await.unwrap();
        assert_eq!(view_rx.borrow_and_update().name(), "completed");

        tokio::time::sleep(Duration::from_millis(DEFAULT_DWELL_MS - 100)).await;
        assert_eq!(view_rx.borrow().name(), "completed");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(view_rx.borrow().name(), "idle");

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_replayed_old_completion_folds_to_idle() {
        let (mut sub, _rx) = DisplaySubscriber::new(Duration::from_millis(DEFAULT_DWELL_MS));
        let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
        let replayed = completed(DEFAULT_DWELL_MS).into_envelope(7, "t-1", an_hour_ago).unwrap();

        assert_eq!(sub.apply(&replayed), ApplyOutcome::Applied);
        assert_eq!(sub.view().name(), "idle");
        assert!(sub.dwell_deadline().is_none());
    }

    #[tokio::test]
    async fn test_recent_completion_keeps_only_remaining_dwell() {
        let (mut sub, _rx) = DisplaySubscriber::new(Duration::from_millis(DEFAULT_DWELL_MS));
        let three_secs_ago = Utc::now() - chrono::Duration::seconds(3);
        let replayed = completed(5000).into_envelope(1, "t-1", three_secs_ago).unwrap();

        let before = Instant::now();
        sub.apply(&replayed);
        assert_eq!(sub.view().name(), "completed");

        let deadline = sub.dwell_deadline().unwrap();
        assert!(deadline <= before + Duration::from_millis(2_050));
        assert!(deadline > before + Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_future_timestamp_gets_full_dwell() {
        let (mut sub, _rx) = DisplaySubscriber::new(Duration::from_millis(DEFAULT_DWELL_MS));
        let skewed = Utc::now() + chrono::Duration::seconds(30);
        let before = Instant::now();
        sub.apply(&completed(5000).into_envelope(1, "t-1", skewed).unwrap());

        assert_eq!(sub.view().name(), "completed");
        assert!(sub.dwell_deadline().unwrap() >= before + Duration::from_millis(4_900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_order_cancels_dwell() {
        let (sub, view_rx) = DisplaySubscriber::new(Duration::from_secs(5));
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(sub.run(rx));

        let mut cart = Cart::new();
        cart.add_item(&product("cola", 150), None).unwrap();
        tx.send(env(completed(5000), 1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(env(snapshot(&cart), 2)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(view_rx.borrow().name(), "building");
    }
}
