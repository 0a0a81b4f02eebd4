//! # tally-display: Customer Display Sync for Tally POS
//!
//! A one-way, at-most-once event stream that mirrors the terminal's cart
//! and payment state onto customer-facing screens.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TERMINAL                                  CUSTOMER DISPLAY             │
//! │                                                                         │
//! │  TerminalSession                                                        │
//! │       │ cart_update / payment_started / order_completed / cart_cleared │
//! │       ▼                                                                 │
//! │  DisplayPublisher ──► DisplayHub (/ws) ══ ws ══► DisplayTransport      │
//! │   seq + source         replay latest               reconnect/backoff   │
//! │                                                          │              │
//! │                                                          ▼              │
//! │                                                  DisplaySubscriber     │
//! │                                                   view + dwell timer   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why Snapshots
//! Delivery is fire-and-forget with no retry. Each `cart_update` carries the
//! whole cart, so the display is correct after any single event it receives.
//!
//! ## Module Organization
//!
//! - [`protocol`] - Envelope, events and handshake frames
//! - [`publisher`] - Sequenced event source on the terminal
//! - [`subscriber`] - View model folding on the display
//! - [`hub`] - Axum WebSocket server on the terminal
//! - [`transport`] - Reconnecting WebSocket client on the display
//! - [`config`] - Display process configuration
//! - [`error`] - Error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod publisher;
pub mod subscriber;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::DisplayConfig;
pub use error::{DisplayError, DisplayResult};
pub use hub::{DisplayHub, HubConfig, HubHandle, DEFAULT_HUB_PORT};
pub use protocol::{
    CartSnapshot, DisplayEnvelope, DisplayEvent, OrderCompleted, PaymentStarted, DEFAULT_DWELL_MS, PROTOCOL_VERSION,
};
pub use publisher::DisplayPublisher;
pub use subscriber::{ApplyOutcome, DisplaySubscriber, DisplayView};
pub use transport::{ConnectionState, DisplayTransport, TransportConfig, TransportHandle};
