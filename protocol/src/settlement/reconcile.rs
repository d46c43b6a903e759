//! # Batch Reconciliation
//!
//! The agent comes back online with a pile of redemption records. Each one
//! claims "I delivered this order and collected this coin". We believe it
//! only if the server's own state agrees, and we apply it at most once.
//!
//! ## Atomicity
//!
//! One sled transaction per record, covering both the order and the coin.
//! The "is it already settled?" check runs inside that transaction, so two
//! agents (or one agent retrying) submitting the same record concurrently
//! cannot both flip it. A conflict on one record never blocks its
//! siblings.
//!
//! ## Outcomes
//!
//! | Server state                               | Outcome          |
//! |--------------------------------------------|------------------|
//! | order unknown                              | `AlreadySettled` |
//! | user or agent disagrees                    | `Conflict`       |
//! | order not Offline                          | `Conflict`       |
//! | coin unknown or for another order          | `Conflict`       |
//! | order Delivered (coin forced Inactive)     | `AlreadySettled` |
//! | order Pending, coin Active                 | `Settled`        |
//! | order Pending, coin Inactive               | `Conflict`       |

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MAX_RECONCILE_BATCH;
use crate::order::{Coin, CoinStatus, DeliveryStatus, Order, RedemptionRecord};
use crate::storage::db::{tx_decode, tx_encode};
use crate::storage::{DbResult, OrderDb};

use super::error::ReconcileError;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a record could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictReason {
    /// The record names a different payer than the order.
    UserMismatch,
    /// The record names a different agent than the order.
    AgentMismatch,
    /// The order is not settled with coins.
    NotOffline,
    /// No coin with that id exists.
    CoinMissing,
    /// The coin exists but pays for another order.
    CoinOrderMismatch,
    /// The order is Pending yet its coin is already spent.
    CoinAlreadySpent,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::UserMismatch => "user does not match order",
            Self::AgentMismatch => "agent does not match order",
            Self::NotOffline => "order is not an offline order",
            Self::CoinMissing => "coin does not exist",
            Self::CoinOrderMismatch => "coin belongs to another order",
            Self::CoinAlreadySpent => "coin already inactive while order pending",
        };
        f.write_str(text)
    }
}

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason")]
pub enum RecordOutcome {
    /// Order flipped to Delivered, coin to Inactive.
    Settled,
    /// Nothing to do. Counts as success.
    AlreadySettled,
    /// Left untouched and reported.
    Conflict(ConflictReason),
}

/// One record and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReport {
    #[serde(flatten)]
    pub record: RedemptionRecord,
    pub outcome: RecordOutcome,
}

/// Result of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    /// One entry per submitted record, in submission order.
    pub reports: Vec<RecordReport>,
    pub settled: usize,
    pub already_settled: usize,
    pub conflicts: usize,
}

impl ReconcileSummary {
    fn push(&mut self, record: RedemptionRecord, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Settled => self.settled += 1,
            RecordOutcome::AlreadySettled => self.already_settled += 1,
            RecordOutcome::Conflict(_) => self.conflicts += 1,
        }
        self.reports.push(RecordReport { record, outcome });
    }

    /// `true` if nothing conflicted.
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0
    }
}

// ---------------------------------------------------------------------------
// Per-record transaction
// ---------------------------------------------------------------------------

impl OrderDb {
    /// Apply one redemption record in its own serializable transaction.
    pub fn settle_record(&self, record: &RedemptionRecord) -> DbResult<RecordOutcome> {
        self.transact_order_and_coin(|orders, coins| {
            let mut order: Order = match orders.get(record.order_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return Ok(RecordOutcome::AlreadySettled),
            };

            if order.user_id != record.user_id {
                return Ok(RecordOutcome::Conflict(ConflictReason::UserMismatch));
            }
            if order.assigned_agent_id.as_deref() != Some(record.assigned_agent_id.as_str()) {
                return Ok(RecordOutcome::Conflict(ConflictReason::AgentMismatch));
            }
            if !order.is_offline() {
                return Ok(RecordOutcome::Conflict(ConflictReason::NotOffline));
            }

            let mut coin: Coin = match coins.get(record.coin_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return Ok(RecordOutcome::Conflict(ConflictReason::CoinMissing)),
            };
            if coin.order_id != order.order_id {
                return Ok(RecordOutcome::Conflict(ConflictReason::CoinOrderMismatch));
            }

            if order.delivery_status == DeliveryStatus::Delivered {
                // Delivered orders never keep a spendable coin.
                if coin.is_active() {
                    coin.status = CoinStatus::Inactive;
                    coins.insert(coin.coin_id.as_bytes(), tx_encode(&coin)?)?;
                }
                return Ok(RecordOutcome::AlreadySettled);
            }
            if !coin.is_active() {
                return Ok(RecordOutcome::Conflict(ConflictReason::CoinAlreadySpent));
            }

            order.delivery_status = DeliveryStatus::Delivered;
            coin.status = CoinStatus::Inactive;
            orders.insert(order.order_id.as_bytes(), tx_encode(&order)?)?;
            coins.insert(coin.coin_id.as_bytes(), tx_encode(&coin)?)?;
            Ok(RecordOutcome::Settled)
        })
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Reject a batch that should not touch the store at all.
pub fn validate_batch(records: &[RedemptionRecord]) -> Result<(), ReconcileError> {
    if records.is_empty() {
        return Err(ReconcileError::EmptyBatch);
    }
    if records.len() > MAX_RECONCILE_BATCH {
        return Err(ReconcileError::BatchTooLarge {
            len: records.len(),
            max: MAX_RECONCILE_BATCH,
        });
    }
    for (index, record) in records.iter().enumerate() {
        if let Some(field) = record.first_empty_field() {
            return Err(ReconcileError::InvalidRecord { index, field });
        }
    }
    Ok(())
}

/// Validate and apply a batch of redemption records.
pub fn reconcile(
    db: &OrderDb,
    records: &[RedemptionRecord],
) -> Result<ReconcileSummary, ReconcileError> {
    validate_batch(records)?;

    let mut summary = ReconcileSummary::default();
    for (processed, record) in records.iter().enumerate() {
        let outcome = db
            .settle_record(record)
            .map_err(|source| ReconcileError::Storage { processed, source })?;

        if let RecordOutcome::Conflict(reason) = outcome {
            warn!(%record, %reason, "redemption conflict");
        }
        summary.push(record.clone(), outcome);
    }

    db.flush()
        .map_err(|source| ReconcileError::Storage {
            processed: records.len(),
            source,
        })?;

    info!(
        records = records.len(),
        settled = summary.settled,
        already_settled = summary.already_settled,
        conflicts = summary.conflicts,
        "batch reconciled"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
