//! # Stock Transfer Saga
//!
//! Moves stock between two products or variants with two independent store
//! calls and an explicit compensation step. There is no lock across the
//! legs; another writer may touch either counter in between.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Pending ──debit ok──► Debited ──credit ok──► Completed               │
//! │      │                     │                                            │
//! │  debit err             credit err                                       │
//! │      ▼                     ▼                                            │
//! │   Aborted            Compensating ──restore ok──► Compensated          │
//! │  (nothing moved)           │                     (nothing moved)        │
//! │                       restore err                                       │
//! │                            ▼                                            │
//! │                   CompensationFailed ──► ReconciliationLedger          │
//! │                   (source short by qty, no retry)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adjustments Written
//! | Leg        | Item | Change      | Reason     | Reference                  |
//! |------------|------|-------------|------------|----------------------------|
//! | debit      | from | -quantity   | TRANSFER   | `transfer:<id>:debit`      |
//! | credit     | to   | +quantity   | TRANSFER   | `transfer:<id>:credit`     |
//! | compensate | from | +quantity   | CORRECTION | `transfer:<id>:compensate` |

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::validation::{validate_transfer, ValidTransfer};
use tally_core::{AdjustmentReason, AdjustmentRecord, ItemKey, StockAdjustment, StockTransfer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{TransferError, TransferResult};
use crate::reservation::StockReservationClient;

// =============================================================================
// Saga
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    Debited,
    Completed,
    Aborted,
    Compensating,
    Compensated,
    CompensationFailed,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Completed
                | TransferState::Aborted
                | TransferState::Compensated
                | TransferState::CompensationFailed
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferState::Pending => "pending",
            TransferState::Debited => "debited",
            TransferState::Completed => "completed",
            TransferState::Aborted => "aborted",
            TransferState::Compensating => "compensating",
            TransferState::Compensated => "compensated",
            TransferState::CompensationFailed => "compensation_failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferLeg {
    Debit,
    Credit,
    Compensate,
}

impl TransferLeg {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferLeg::Debit => "debit",
            TransferLeg::Credit => "credit",
            TransferLeg::Compensate => "compensate",
        }
    }
}

/// One transfer in flight. Not persisted; its durable trace is the
/// adjustments it wrote.
#[derive(Debug, Clone)]
pub struct TransferSaga {
    id: String,
    from: ItemKey,
    to: ItemKey,
    quantity: i64,
    notes: Option<String>,
    state: TransferState,
    debit: Option<AdjustmentRecord>,
    credit: Option<AdjustmentRecord>,
    compensation: Option<AdjustmentRecord>,
}

impl TransferSaga {
    fn new(valid: ValidTransfer, notes: Option<String>) -> Self {
        TransferSaga {
            id: Uuid::new_v4().to_string(),
            from: valid.from,
            to: valid.to,
            quantity: valid.quantity,
            notes,
            state: TransferState::Pending,
            debit: None,
            credit: None,
            compensation: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn from(&self) -> &ItemKey {
        &self.from
    }

    pub fn to(&self) -> &ItemKey {
        &self.to
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn debit(&self) -> Option<&AdjustmentRecord> {
        self.debit.as_ref()
    }

    pub fn credit(&self) -> Option<&AdjustmentRecord> {
        self.credit.as_ref()
    }

    pub fn compensation(&self) -> Option<&AdjustmentRecord> {
        self.compensation.as_ref()
    }

    /// The adjustment a leg writes.
    pub fn leg(&self, leg: TransferLeg) -> StockAdjustment {
        let (item, quantity_change, reason, notes) = match leg {
            TransferLeg::Debit => (
                self.from.clone(),
                -self.quantity,
                AdjustmentReason::Transfer,
                self.notes.clone(),
            ),
            TransferLeg::Credit => (
                self.to.clone(),
                self.quantity,
                AdjustmentReason::Transfer,
                self.notes.clone(),
            ),
            TransferLeg::Compensate => (
                self.from.clone(),
                self.quantity,
                AdjustmentReason::Correction,
                Some(format!("Compensation for failed transfer {}", self.id)),
            ),
        };
        StockAdjustment {
            item,
            quantity_change,
            reason,
            notes,
            reference: Some(format!("transfer:{}:{}", self.id, leg.as_str())),
        }
    }

    fn transition(&mut self, next: TransferState) {
        info!(transfer_id = %self.id, from = %self.state, to = %next, "Transfer state change");
        self.state = next;
    }
}

// =============================================================================
// Reconciliation Ledger
// =============================================================================

/// A transfer whose debit stands with no matching credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationEntry {
    pub transfer_id: String,
    /// Item that was debited and not restored.
    pub item: ItemKey,
    /// Intended destination.
    pub destination: ItemKey,
    pub quantity: i64,
    pub credit_error: String,
    pub compensation_error: String,
    pub recorded_at: DateTime<Utc>,
}

/// Entries needing an operator. Nothing here is retried.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationLedger {
    entries: Arc<Mutex<Vec<ReconciliationEntry>>>,
}

impl ReconciliationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: ReconciliationEntry) {
        self.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<ReconciliationEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns the entry once an operator has fixed the stock.
    pub fn resolve(&self, transfer_id: &str) -> Option<ReconciliationEntry> {
        let mut entries = self.lock();
        let index = entries.iter().position(|e| e.transfer_id == transfer_id)?;
        Some(entries.remove(index))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ReconciliationEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub debit: AdjustmentRecord,
    pub credit: AdjustmentRecord,
}

#[derive(Debug, Clone)]
pub struct TransferService {
    client: StockReservationClient,
    ledger: ReconciliationLedger,
}

impl TransferService {
    pub fn new(client: StockReservationClient) -> Self {
        Self::with_ledger(client, ReconciliationLedger::new())
    }

    pub fn with_ledger(client: StockReservationClient, ledger: ReconciliationLedger) -> Self {
        TransferService { client, ledger }
    }

    pub fn ledger(&self) -> &ReconciliationLedger {
        &self.ledger
    }

    /// Fail-fast precondition checks. Makes no remote call.
    pub fn begin(&self, request: &StockTransfer) -> TransferResult<TransferSaga> {
        let valid = validate_transfer(request).map_err(|err| {
            warn!(error = %err, "Transfer rejected");
            TransferError::Invalid(err)
        })?;
        Ok(TransferSaga::new(valid, request.notes.clone()))
    }

    /// Validates and runs a transfer to a terminal state.
    pub async fn transfer(&self, request: &StockTransfer) -> TransferResult<TransferReceipt> {
        let mut saga = self.begin(request)?;
        self.run(&mut saga).await
    }

    /// Drives a `Pending` saga to a terminal state.
    ///
    /// A saga runs once. Any other state is rejected without a store call.
    pub async fn run(&self, saga: &mut TransferSaga) -> TransferResult<TransferReceipt> {
        if saga.state != TransferState::Pending {
            warn!(transfer_id = %saga.id, state = %saga.state, "Transfer already ran");
            return Err(TransferError::AlreadyRun {
                transfer_id: saga.id.clone(),
                state: saga.state,
            });
        }

        info!(
            transfer_id = %saga.id,
            from = %saga.from,
            to = %saga.to,
            quantity = saga.quantity,
            "Transfer started"
        );

        // Leg 1: debit the source.
        let debit = match self.client.adjust(saga.leg(TransferLeg::Debit)).await {
            Ok(record) => record,
            Err(err) => {
                error!(transfer_id = %saga.id, leg = "debit", item = %saga.from, error = %err, "Transfer leg failed");
                saga.transition(TransferState::Aborted);
                return Err(TransferError::DebitFailed {
                    transfer_id: saga.id.clone(),
                    source: err,
                });
            }
        };
        info!(
            transfer_id = %saga.id,
            leg = "debit",
            item = %saga.from,
            resulting_stock = debit.resulting_stock,
            "Transfer leg applied"
        );
        saga.debit = Some(debit.clone());
        saga.transition(TransferState::Debited);

        // Leg 2: credit the destination.
        let credit_error = match self.client.adjust(saga.leg(TransferLeg::Credit)).await {
            Ok(credit) => {
                info!(
                    transfer_id = %saga.id,
                    leg = "credit",
                    item = %saga.to,
                    resulting_stock = credit.resulting_stock,
                    "Transfer leg applied"
                );
                saga.credit = Some(credit.clone());
                saga.transition(TransferState::Completed);
                return Ok(TransferReceipt {
                    transfer_id: saga.id.clone(),
                    debit,
                    credit,
                });
            }
            Err(err) => err,
        };
        error!(transfer_id = %saga.id, leg = "credit", item = %saga.to, error = %credit_error, "Transfer leg failed");

        // Compensation: put the debited stock back, once.
        saga.transition(TransferState::Compensating);
        match self.client.adjust(saga.leg(TransferLeg::Compensate)).await {
            Ok(compensation) => {
                warn!(
                    transfer_id = %saga.id,
                    leg = "compensate",
                    item = %saga.from,
                    resulting_stock = compensation.resulting_stock,
                    "Transfer compensated"
                );
                saga.compensation = Some(compensation.clone());
                saga.transition(TransferState::Compensated);
                Err(TransferError::CreditFailed {
                    transfer_id: saga.id.clone(),
                    credit_error,
                    compensation: Box::new(compensation),
                })
            }
            Err(compensation_error) => {
                error!(
                    transfer_id = %saga.id,
                    leg = "compensate",
                    item = %saga.from,
                    quantity = saga.quantity,
                    error = %compensation_error,
                    "Transfer compensation failed, manual reconciliation required"
                );
                saga.transition(TransferState::CompensationFailed);

                let entry = ReconciliationEntry {
                    transfer_id: saga.id.clone(),
                    item: saga.from.clone(),
                    destination: saga.to.clone(),
                    quantity: saga.quantity,
                    credit_error: credit_error.to_string(),
                    compensation_error: compensation_error.to_string(),
                    recorded_at: self.client.clock().now(),
                };
                self.ledger.record(entry.clone());

                Err(TransferError::CompensationFailed {
                    transfer_id: saga.id.clone(),
                    credit_error,
                    compensation_error,
                    entry: Box::new(entry),
                })
            }
        }
    }
}
