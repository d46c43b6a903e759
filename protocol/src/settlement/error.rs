//! Reconciliation errors.
//!
//! These are batch-level failures. Per-record problems are not errors;
//! they are [`RecordOutcome`](super::RecordOutcome)s.

use thiserror::Error;

use crate::storage::DbError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The batch had no records.
    #[error("reconciliation batch is empty")]
    EmptyBatch,

    /// The batch exceeds the per-request limit.
    #[error("reconciliation batch has {len} records, limit is {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// A record is missing a required field. Nothing was applied.
    #[error("record {index}: {field} is required")]
    InvalidRecord { index: usize, field: &'static str },

    /// The store failed mid-batch. Records before the failing one are
    /// committed; resubmitting the whole batch is safe.
    #[error("storage error after {processed} records: {source}")]
    Storage {
        processed: usize,
        #[source]
        source: DbError,
    },
}
