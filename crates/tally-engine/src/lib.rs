//! # tally-engine: Terminal Orchestration for Tally POS
//!
//! Session-scoped state machines that sit between the terminal UI and the
//! stock store.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TerminalSession                                 │
//! │                                                                         │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────────────────┐    │
//! │  │  CartEngine  │  │ NumpadSession  │  │  CheckoutOrchestrator    │    │
//! │  │              │  │                │  │                          │    │
//! │  │ Cart + totals│◄─┤ quantity/weight│  │ Building → Settling →    │    │
//! │  │ recomputed on│  │ /price commits │  │ Completed | Failed       │    │
//! │  │ every change │  │ cash ─────────────►                          │    │
//! │  └──────┬───────┘  └────────────────┘  └────────────┬─────────────┘    │
//! │         │                                           │                   │
//! │         ▼                                           ▼                   │
//! │  DisplayPublisher (tally-display)        StockReservationClient         │
//! │                                                     │                   │
//! │  TransferService (saga) ────────────────────────────┤                   │
//! │  ProductNameValidator ──────────────────────────────┤                   │
//! │                                                     ▼                   │
//! │                                          StockStore (tally-db)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`session`] - One checkout lane: cart, numpad routing, display feed
//! - [`cart_engine`] - Cart with synchronous repricing and change notifications
//! - [`checkout`] - Checkout state machine and settlement
//! - [`reservation`] - Command interface over the stock store, lazy expiry
//! - [`transfer`] - Two-step stock transfer saga with compensation
//! - [`name_check`] - Debounced product name validation
//! - [`config`] - Terminal configuration (TOML + environment)
//! - [`clock`] - Injectable time source
//! - [`telemetry`] - Tracing setup
//! - [`error`] - Error types and user-facing notices
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_engine::{TerminalConfig, TerminalSession};
//! use tally_db::MemoryStore;
//! use tally_display::DisplayPublisher;
//!
//! let config = TerminalConfig::load_or_default(None);
//! let mut session = TerminalSession::from_config(&config, Arc::new(MemoryStore::new()), DisplayPublisher::new());
//!
//! session.scan("milk", None).await?;
//! session.select_payment(PaymentMethod::Cash).await?;
//! session.confirm_cash(Money::from_cents(2000)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart_engine;
pub mod checkout;
pub mod clock;
pub mod config;
pub mod error;
pub mod name_check;
pub mod reservation;
pub mod session;
pub mod telemetry;
pub mod transfer;

// =============================================================================
// Re-exports
// =============================================================================

pub use cart_engine::{CartChange, CartEngine};
pub use checkout::{CheckoutOptions, CheckoutOrchestrator, CheckoutReceipt, CheckoutState, CheckoutStep};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TerminalConfig;
pub use error::{
    CheckoutError, CheckoutResult, EngineError, EngineResult, ErrorCode, ErrorNotice, TransferError, TransferResult,
};
pub use name_check::{NameValidation, ProductNameValidator, NAME_CHECK_DEBOUNCE};
pub use reservation::{StockCommand, StockOutcome, StockReservationClient};
pub use session::{NumpadOutcome, TerminalSession};
pub use telemetry::init_tracing;
pub use transfer::{
    ReconciliationEntry, ReconciliationLedger, TransferLeg, TransferReceipt, TransferSaga, TransferService,
    TransferState,
};
