//! # Display Publisher
//!
//! Turns terminal state transitions into a sequenced event stream.
//!
//! ```text
//! ┌───────────────┐   publish()   ┌──────────────────┐   broadcast   ┌──────────┐
//! │ TerminalSession│ ───────────► │ DisplayPublisher │ ────────────► │ Hub conn │ ...
//! └───────────────┘               │  seq += 1        │               └──────────┘
//!                                 │  latest = env    │ ── watch ──► replay on connect
//!                                 └──────────────────┘
//! ```
//!
//! Publishing never waits on a display. With no display connected the
//! event is dropped (at-most-once); the next snapshot supersedes it anyway.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::{CartSnapshot, DisplayEnvelope, DisplayEvent, OrderCompleted, PaymentStarted};
use tally_core::{CalculationResult, Cart, Money, Order, PaymentMethod};

/// Buffered events per lagging connection before it starts skipping.
const CHANNEL_CAPACITY: usize = 64;

/// Sequenced, fire-and-forget event source.
///
/// Cheap to clone; clones share the sequence counter.
#[derive(Debug, Clone)]
pub struct DisplayPublisher {
    source: Arc<str>,
    seq: Arc<AtomicU64>,
    events: broadcast::Sender<DisplayEnvelope>,
    latest: Arc<watch::Sender<Option<DisplayEnvelope>>>,
}

impl Default for DisplayPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayPublisher {
    /// Creates a publisher with a fresh source id.
    pub fn new() -> Self {
        Self::with_source(format!("terminal-{}", Uuid::new_v4()))
    }

    pub fn with_source(source: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (latest, _) = watch::channel(None);
        DisplayPublisher {
            source: Arc::from(source.into()),
            seq: Arc::new(AtomicU64::new(0)),
            events,
            latest: Arc::new(latest),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Publishes an event. Returns its sequence number, or `None` if it
    /// could not be encoded.
    pub fn publish(&self, event: DisplayEvent) -> Option<u64> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let kind = event.kind();

        let envelope = match event.into_envelope(seq, &self.source, Utc::now()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(kind, seq, error = %e, "Failed to encode display event");
                return None;
            }
        };

        self.latest.send_replace(Some(envelope.clone()));
        match self.events.send(envelope) {
            Ok(receivers) => debug!(kind, seq, receivers, "Display event published"),
            Err(_) => debug!(kind, seq, "No display connected, event dropped"),
        }
        Some(seq)
    }

    pub fn cart_update(&self, cart: &Cart, calculation: &CalculationResult) -> Option<u64> {
        self.publish(DisplayEvent::CartUpdate(CartSnapshot::capture(cart, calculation)))
    }

    pub fn payment_started(&self, method: PaymentMethod, amount_due: Money) -> Option<u64> {
        self.publish(DisplayEvent::PaymentStarted(PaymentStarted { method, amount_due }))
    }

    pub fn order_completed(&self, order: Order, change: Option<Money>, dwell_ms: u64) -> Option<u64> {
        self.publish(DisplayEvent::OrderCompleted(OrderCompleted {
            order,
            change,
            dwell_ms,
        }))
    }

    pub fn cart_cleared(&self) -> Option<u64> {
        self.publish(DisplayEvent::CartCleared)
    }

    /// Live event stream, starting after the current event.
    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEnvelope> {
        self.events.subscribe()
    }

    /// Most recent event, replayed to displays that connect late.
    pub fn latest(&self) -> Option<DisplayEnvelope> {
        self.latest.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_displays_does_not_fail() {
        let publisher = DisplayPublisher::with_source("t-1");
        assert_eq!(publisher.cart_cleared(), Some(1));
        assert_eq!(publisher.cart_cleared(), Some(2));
        assert_eq!(publisher.latest().unwrap().seq, 2);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let publisher = DisplayPublisher::with_source("t-1");
        let mut rx = publisher.subscribe();

        publisher.payment_started(PaymentMethod::ExternalCard, Money::from_cents(500));
        publisher.cart_cleared();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.kind.as_str(), first.seq), ("payment_started", 1));
        assert_eq!((second.kind.as_str(), second.seq), ("cart_cleared", 2));
        assert_eq!(second.source, "t-1");
    }

    #[test]
    fn test_clones_share_sequence() {
        let publisher = DisplayPublisher::new();
        let clone = publisher.clone();
        publisher.cart_cleared();
        assert_eq!(clone.cart_cleared(), Some(2));
        assert_eq!(clone.source(), publisher.source());
    }
}
