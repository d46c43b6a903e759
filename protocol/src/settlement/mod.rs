//! # Settlement
//!
//! Server-side reconciliation of redemption records logged offline by
//! agents. See [`reconcile`] for the per-record rules.

pub mod error;
pub mod reconcile;

pub use error::ReconcileError;
pub use reconcile::{
    reconcile, validate_batch, ConflictReason, ReconcileSummary, RecordOutcome, RecordReport,
};
