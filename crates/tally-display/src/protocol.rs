//! # Display Protocol
//!
//! Wire messages between the terminal and its customer displays.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Display Protocol Messages                          │
//! │                                                                         │
//! │  HANDSHAKE (control frames)                                            │
//! │  ─────────                                                             │
//! │  DISPLAY  ───► hello   { displayId, storeId, protocolVersion }         │
//! │  TERMINAL ◄─── welcome { terminalId, storeId, serverTime }             │
//! │  TERMINAL ◄─── error   { code, message }   (then close)                │
//! │                                                                         │
//! │  EVENTS (terminal → display, at-most-once)                             │
//! │  ──────                                                                 │
//! │  cart_update      full CartSnapshot, never a diff                      │
//! │  payment_started  method + amount due                                  │
//! │  order_completed  finalized order + change + dwellMs                   │
//! │  cart_cleared     no payload                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Event Envelope
//! ```json
//! {
//!   "type": "cart_update",
//!   "payload": { "items": [...], "subtotal": 1099, "tax": 91, "total": 1190 },
//!   "timestamp": "2026-01-01T12:00:00Z",
//!   "seq": 42,
//!   "source": "terminal-7f3a..."
//! }
//! ```
//!
//! The envelope is decoded before the payload, so a display can skip event
//! types it does not know yet instead of failing on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::{DisplayError, DisplayResult};
use tally_core::{CalculationResult, Cart, LineItem, Money, Order, PaymentMethod, TaxRate};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// How long a completed order stays on screen before the display reverts.
pub const DEFAULT_DWELL_MS: u64 = 5_000;

// =============================================================================
// Event Payloads
// =============================================================================

/// Everything a display needs to draw the cart, with no prior state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub items: Vec<LineItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub tax_rate: TaxRate,
    pub total: Money,
}

impl CartSnapshot {
    pub fn capture(cart: &Cart, calculation: &CalculationResult) -> Self {
        CartSnapshot {
            items: cart.items().to_vec(),
            subtotal: calculation.subtotal,
            tax: calculation.tax,
            tax_rate: calculation.tax_rate,
            total: calculation.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStarted {
    pub method: PaymentMethod,
    pub amount_due: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompleted {
    pub order: Order,
    /// Cash change handed back, if paid in cash.
    pub change: Option<Money>,
    pub dwell_ms: u64,
}

// =============================================================================
// Display Event
// =============================================================================

/// A state transition mirrored to the customer display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    CartUpdate(CartSnapshot),
    PaymentStarted(PaymentStarted),
    OrderCompleted(OrderCompleted),
    CartCleared,
}

impl DisplayEvent {
    pub const CART_UPDATE: &'static str = "cart_update";
    pub const PAYMENT_STARTED: &'static str = "payment_started";
    pub const ORDER_COMPLETED: &'static str = "order_completed";
    pub const CART_CLEARED: &'static str = "cart_cleared";

    /// Wire `type` of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            DisplayEvent::CartUpdate(_) => Self::CART_UPDATE,
            DisplayEvent::PaymentStarted(_) => Self::PAYMENT_STARTED,
            DisplayEvent::OrderCompleted(_) => Self::ORDER_COMPLETED,
            DisplayEvent::CartCleared => Self::CART_CLEARED,
        }
    }

    fn payload(&self) -> DisplayResult<Value> {
        Ok(match self {
            DisplayEvent::CartUpdate(snapshot) => serde_json::to_value(snapshot)?,
            DisplayEvent::PaymentStarted(payment) => serde_json::to_value(payment)?,
            DisplayEvent::OrderCompleted(completed) => serde_json::to_value(completed)?,
            DisplayEvent::CartCleared => Value::Null,
        })
    }

    /// Wraps the event for the wire.
    pub fn into_envelope(self, seq: u64, source: &str, timestamp: DateTime<Utc>) -> DisplayResult<DisplayEnvelope> {
        Ok(DisplayEnvelope {
            kind: self.kind().to_string(),
            payload: self.payload()?,
            timestamp,
            seq,
            source: source.to_string(),
        })
    }
}

/// Event as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    /// Per-source sequence number, starting at 1.
    pub seq: u64,
    /// Publisher instance id.
    pub source: String,
}

impl DisplayEnvelope {
    /// Decodes the payload.
    ///
    /// ## Returns
    /// * `Ok(Some(event))` - known type, valid payload
    /// * `Ok(None)` - unknown type (ignored for forward compatibility)
    /// * `Err(_)` - known type with a malformed payload
    pub fn decode(&self) -> DisplayResult<Option<DisplayEvent>> {
        let event = match self.kind.as_str() {
            DisplayEvent::CART_UPDATE => DisplayEvent::CartUpdate(serde_json::from_value(self.payload.clone())?),
            DisplayEvent::PAYMENT_STARTED => {
                DisplayEvent::PaymentStarted(serde_json::from_value(self.payload.clone())?)
            }
            DisplayEvent::ORDER_COMPLETED => {
                DisplayEvent::OrderCompleted(serde_json::from_value(self.payload.clone())?)
            }
            DisplayEvent::CART_CLEARED => DisplayEvent::CartCleared,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn to_json(&self) -> DisplayResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// Control Frames
// =============================================================================

/// Handshake frames, tagged `{ "type": "hello", "payload": {...} }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ControlMessage {
    Hello(HelloPayload),
    Welcome(WelcomePayload),
    Error { code: String, message: String },
}

impl ControlMessage {
    pub const STORE_MISMATCH: &'static str = "STORE_MISMATCH";
    pub const UNSUPPORTED_VERSION: &'static str = "UNSUPPORTED_VERSION";

    pub fn to_json(&self) -> DisplayResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub display_id: String,
    pub store_id: String,
    pub protocol_version: u32,
}

impl HelloPayload {
    pub fn new(display_id: &str, store_id: &str) -> Self {
        HelloPayload {
            display_id: display_id.to_string(),
            store_id: store_id.to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub terminal_id: String,
    pub store_id: String,
    pub server_time: String,
}

/// Any frame a display can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(ControlMessage),
    Event(DisplayEnvelope),
}

impl Frame {
    /// Parses a text frame: control messages first, then event envelopes.
    pub fn parse(text: &str) -> DisplayResult<Frame> {
        if let Ok(control) = serde_json::from_str::<ControlMessage>(text) {
            return Ok(Frame::Control(control));
        }
        serde_json::from_str::<DisplayEnvelope>(text)
            .map(Frame::Event)
            .map_err(|e| DisplayError::InvalidMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(kind: &str, payload: Value) -> DisplayEnvelope {
        DisplayEnvelope {
            kind: kind.to_string(),
            payload,
            timestamp: Utc::now(),
            seq: 1,
            source: "t-1".to_string(),
        }
    }

    #[test]
    fn test_envelope_wire_shape() {
        let env = DisplayEvent::PaymentStarted(PaymentStarted {
            method: PaymentMethod::Cash,
            amount_due: Money::from_cents(1190),
        })
        .into_envelope(7, "t-1", Utc::now())
        .unwrap();

        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "payment_started");
        assert_eq!(value["seq"], 7);
        assert_eq!(value["source"], "t-1");
        assert_eq!(value["payload"]["amountDue"], 1190);
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let env = envelope("loyalty_points", json!({ "points": 12 }));
        assert_eq!(env.decode().unwrap(), None);
    }

    #[test]
    fn test_malformed_known_payload_errors() {
        let env = envelope("cart_update", json!({ "items": "nope" }));
        assert!(env.decode().is_err());
    }

    #[test]
    fn test_cart_cleared_ignores_payload() {
        let env = envelope("cart_cleared", Value::Null);
        assert_eq!(env.decode().unwrap(), Some(DisplayEvent::CartCleared));
    }

    #[test]
    fn test_frame_parse() {
        let hello = ControlMessage::Hello(HelloPayload::new("d-1", "s-1"));
        assert!(matches!(
            Frame::parse(&hello.to_json().unwrap()).unwrap(),
            Frame::Control(ControlMessage::Hello(_))
        ));

        let event = DisplayEvent::CartCleared.into_envelope(1, "t-1", Utc::now()).unwrap();
        assert!(matches!(
            Frame::parse(&event.to_json().unwrap()).unwrap(),
            Frame::Event(_)
        ));

        assert!(Frame::parse("not json").is_err());
    }
}
