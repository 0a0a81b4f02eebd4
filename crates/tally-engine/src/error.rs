//! # Engine Errors and Notices
//!
//! Typed errors for the orchestration layer, and the [`ErrorNotice`] every
//! failure becomes before it reaches a cashier or an operator.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally POS                              │
//! │                                                                         │
//! │  CoreError (cart, numpad, cash)   ─┐                                    │
//! │  DbError   (remote store)         ─┼──► CheckoutError ─┐                │
//! │                                    │                   ├──► EngineError │
//! │                                    └──► TransferError ─┘        │       │
//! │                                                                 ▼       │
//! │                                            ErrorNotice { code, message }│
//! │                                                                         │
//! │  {                                                                      │
//! │    "code": "MANUAL_RECONCILIATION_REQUIRED",                            │
//! │    "message": "Transfer 3f2e... needs manual reconciliation: ..."       │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote failures keep the store's own message. A failed compensation has
//! its own code and is never reported as a plain transfer failure.

use serde::{Deserialize, Serialize};
use tally_core::{AdjustmentRecord, CoreError, NumpadMode, ValidationError};
use tally_db::DbError;
use tally_display::DisplayError;
use thiserror::Error;

use crate::transfer::{ReconciliationEntry, TransferState};

// =============================================================================
// Notice
// =============================================================================

/// A discrete, actionable failure message.
///
/// ```json
/// { "code": "INSUFFICIENT_CASH", "message": "Received $10.00, total is $12.99" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    CartError,
    /// A capture is open, missing, or aimed at nothing.
    NumpadError,
    InsufficientStock,
    InsufficientCash,
    /// The action is not allowed in the current checkout state.
    BusinessLogic,
    /// The store refused or failed a call.
    StoreError,
    /// The store could not be reached; the same call may succeed later.
    StoreUnavailable,
    SettlementFailed,
    /// Transfer did not move stock. Nothing to reconcile.
    TransferFailed,
    /// Stock was debited and could not be restored.
    ManualReconciliationRequired,
    ConfigError,
    Internal,
}

impl ErrorNotice {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ErrorNotice {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ErrorNotice::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ErrorNotice::new(ErrorCode::Internal, message)
    }
}

impl std::fmt::Display for ErrorNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

fn core_notice(err: &CoreError) -> ErrorNotice {
    let code = match err {
        CoreError::ItemNotFound(_) | CoreError::VariantNotFound { .. } => ErrorCode::NotFound,
        CoreError::ProductInactive(_)
        | CoreError::CartTooLarge { .. }
        | CoreError::FieldNotApplicable { .. }
        | CoreError::EmptyCart
        | CoreError::StaleCalculation { .. }
        | CoreError::UnpricedLine(_) => ErrorCode::CartError,
        CoreError::QuantityTooLarge { .. } | CoreError::Validation(_) => ErrorCode::ValidationError,
        CoreError::InsufficientCash { .. } => ErrorCode::InsufficientCash,
    };
    ErrorNotice::new(code, err.to_string())
}

fn store_notice(err: &DbError) -> ErrorNotice {
    let code = match err {
        DbError::NotFound { .. } => ErrorCode::NotFound,
        DbError::UniqueViolation { .. } => ErrorCode::ValidationError,
        DbError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
        DbError::InvalidState { .. } => ErrorCode::BusinessLogic,
        DbError::Unavailable(_) | DbError::ConnectionFailed(_) | DbError::PoolExhausted => {
            ErrorCode::StoreUnavailable
        }
        DbError::ForeignKeyViolation { .. }
        | DbError::MigrationFailed(_)
        | DbError::QueryFailed(_)
        | DbError::Internal(_) => ErrorCode::StoreError,
    };
    ErrorNotice::new(code, err.to_string())
}

impl From<&CoreError> for ErrorNotice {
    fn from(err: &CoreError) -> Self {
        core_notice(err)
    }
}

impl From<&DbError> for ErrorNotice {
    fn from(err: &DbError) -> Self {
        store_notice(err)
    }
}

// =============================================================================
// Checkout
// =============================================================================

#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The requested action is not valid from the current state.
    #[error("Cannot {action} while checkout is {state}")]
    InvalidTransition { action: &'static str, state: &'static str },

    /// Rejected locally before any remote call (empty cart, stale totals, short cash).
    #[error(transparent)]
    Rejected(#[from] CoreError),

    #[error("Could not reserve {item}: {source}")]
    ReservationFailed {
        item: String,
        #[source]
        source: DbError,
    },

    /// The cart is kept for a retry.
    #[error("Settlement of order {order_id} failed: {source}")]
    SettlementFailed {
        order_id: String,
        #[source]
        source: DbError,
    },

    /// The checkout was cancelled, but some holds are still ACTIVE on the store.
    #[error("{failed} reservation(s) could not be released, first was {reservation_id}: {source}")]
    ReleaseFailed {
        reservation_id: String,
        failed: usize,
        #[source]
        source: DbError,
    },
}

impl CheckoutError {
    pub fn notice(&self) -> ErrorNotice {
        match self {
            CheckoutError::InvalidTransition { .. } => ErrorNotice::new(ErrorCode::BusinessLogic, self.to_string()),
            CheckoutError::Rejected(err) => core_notice(err),
            CheckoutError::ReservationFailed { source, .. } => ErrorNotice::new(
                match source {
                    DbError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
                    other => store_notice(other).code,
                },
                self.to_string(),
            ),
            CheckoutError::SettlementFailed { .. } => ErrorNotice::new(ErrorCode::SettlementFailed, self.to_string()),
            CheckoutError::ReleaseFailed { source, .. } => ErrorNotice::new(store_notice(source).code, self.to_string()),
        }
    }
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;

// =============================================================================
// Transfer
// =============================================================================

#[derive(Debug, Error)]
pub enum TransferError {
    /// Failed a precondition. No remote call was made.
    #[error("Invalid transfer: {0}")]
    Invalid(#[from] ValidationError),

    /// Nothing was changed.
    #[error("Transfer {transfer_id} aborted, debit failed: {source}")]
    DebitFailed {
        transfer_id: String,
        #[source]
        source: DbError,
    },

    /// The debit was rolled back by a compensating adjustment.
    #[error("Transfer {transfer_id} failed, credit failed ({credit_error}); debited stock was restored")]
    CreditFailed {
        transfer_id: String,
        credit_error: DbError,
        compensation: Box<AdjustmentRecord>,
    },

    /// The saga already ran; running it again would repeat its legs.
    #[error("Transfer {transfer_id} already ran (state: {state})")]
    AlreadyRun { transfer_id: String, state: TransferState },

    /// The source is short by the transfer quantity until someone fixes it.
    #[error(
        "Transfer {transfer_id} needs manual reconciliation: credit failed ({credit_error}), \
         compensation failed ({compensation_error})"
    )]
    CompensationFailed {
        transfer_id: String,
        credit_error: DbError,
        compensation_error: DbError,
        entry: Box<ReconciliationEntry>,
    },
}

impl TransferError {
    pub fn notice(&self) -> ErrorNotice {
        let code = match self {
            TransferError::Invalid(_) => ErrorCode::ValidationError,
            TransferError::DebitFailed { source, .. } => match source {
                DbError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
                DbError::NotFound { .. } => ErrorCode::NotFound,
                _ => ErrorCode::TransferFailed,
            },
            TransferError::CreditFailed { .. } => ErrorCode::TransferFailed,
            TransferError::AlreadyRun { .. } => ErrorCode::BusinessLogic,
            TransferError::CompensationFailed { .. } => ErrorCode::ManualReconciliationRequired,
        };
        ErrorNotice::new(code, self.to_string())
    }

    pub fn requires_reconciliation(&self) -> bool {
        matches!(self, TransferError::CompensationFailed { .. })
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Display(#[from] DisplayError),

    #[error("A {0} entry is already open")]
    CaptureInProgress(NumpadMode),

    #[error("No numpad entry is open")]
    NoActiveCapture,

    #[error("A {0} entry needs a cart line to apply to")]
    CaptureTargetMissing(NumpadMode),

    /// Cart edits are blocked while a payment is in progress.
    #[error("Cart is locked while checkout is {0}")]
    CartLocked(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSaveFailed(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl EngineError {
    pub fn notice(&self) -> ErrorNotice {
        match self {
            EngineError::Core(err) => core_notice(err),
            EngineError::Store(err) => store_notice(err),
            EngineError::Checkout(err) => err.notice(),
            EngineError::Transfer(err) => err.notice(),
            EngineError::Display(err) => ErrorNotice::internal(err.to_string()),
            EngineError::CaptureInProgress(_) | EngineError::NoActiveCapture | EngineError::CaptureTargetMissing(_) => {
                ErrorNotice::new(ErrorCode::NumpadError, self.to_string())
            }
            EngineError::CartLocked(_) => ErrorNotice::new(ErrorCode::BusinessLogic, self.to_string()),
            EngineError::InvalidConfig(_) | EngineError::ConfigLoadFailed(_) | EngineError::ConfigSaveFailed(_) => {
                ErrorNotice::new(ErrorCode::ConfigError, self.to_string())
            }
            EngineError::Io(_) => ErrorNotice::internal(self.to_string()),
        }
    }
}

impl From<&EngineError> for ErrorNotice {
    fn from(err: &EngineError) -> Self {
        err.notice()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Money;

    #[test]
    fn test_notice_serialization() {
        let notice = ErrorNotice::new(ErrorCode::ManualReconciliationRequired, "fix me");
        let json = serde_json::to_string(&notice).unwrap();
        assert!(json.contains("\"MANUAL_RECONCILIATION_REQUIRED\""));
    }

    #[test]
    fn test_store_notice_keeps_original_message() {
        let err = DbError::Unavailable("connection reset by peer".into());
        let notice = ErrorNotice::from(&err);
        assert_eq!(notice.code, ErrorCode::StoreUnavailable);
        assert!(notice.message.contains("connection reset by peer"));
    }

    #[test]
    fn test_checkout_notices() {
        let short = CheckoutError::Rejected(CoreError::InsufficientCash {
            received: Money::from_cents(1000),
            total: Money::from_cents(1299),
        });
        assert_eq!(short.notice().code, ErrorCode::InsufficientCash);

        let settle = CheckoutError::SettlementFailed {
            order_id: "o-1".into(),
            source: DbError::Unavailable("timeout".into()),
        };
        assert_eq!(settle.notice().code, ErrorCode::SettlementFailed);
        assert!(settle.notice().message.contains("timeout"));
    }

    #[test]
    fn test_transfer_debit_failure_codes() {
        let err = TransferError::DebitFailed {
            transfer_id: "t-1".into(),
            source: DbError::InsufficientStock {
                item: "a".into(),
                available: 1,
                requested: 3,
            },
        };
        assert_eq!(err.notice().code, ErrorCode::InsufficientStock);
        assert!(!err.requires_reconciliation());
    }

    #[test]
    fn test_engine_numpad_errors() {
        let err = EngineError::CaptureInProgress(NumpadMode::Weight);
        assert_eq!(err.notice().code, ErrorCode::NumpadError);
        assert_eq!(EngineError::CartLocked("settling").notice().code, ErrorCode::BusinessLogic);
    }
}
