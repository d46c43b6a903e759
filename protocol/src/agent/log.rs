//! # Redemption Log
//!
//! Append-only record of every token the agent verified while offline.
//! Entries are keyed by sled's monotonic id generator, so iteration order
//! is scan order, even across restarts.
//!
//! Duplicates are kept. Scanning the same token twice logs it twice, and
//! the reconciler absorbs the repeat as `AlreadySettled`.

use sled::{Db, Tree};
use tracing::{debug, info};

use crate::order::RedemptionRecord;
use crate::storage::db::{decode, encode};
use crate::storage::DbResult;

/// A contiguous run of log entries read for submission.
///
/// `through` is the sequence number of the last entry in `records`. Pass the
/// batch back to [`RedemptionLog::clear_through`] once the server has it, so
/// anything appended in the meantime stays put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBatch {
    pub records: Vec<RedemptionRecord>,
    pub through: u64,
}

impl LogBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Persistent, ordered log of verified redemptions.
#[derive(Debug, Clone)]
pub struct RedemptionLog {
    db: Db,
    tree: Tree,
}

impl RedemptionLog {
    pub(crate) fn new(db: Db, tree: Tree) -> Self {
        Self { db, tree }
    }

    /// Append one record and flush it to disk before returning.
    pub fn append(&self, record: &RedemptionRecord) -> DbResult<u64> {
        let seq = self.db.generate_id()?;
        self.tree.insert(seq.to_be_bytes(), encode(record)?)?;
        self.tree.flush()?;
        debug!(seq, order_id = %record.order_id, "redemption logged");
        Ok(seq)
    }

    /// Every entry, oldest first. Nothing is removed.
    pub fn drain(&self) -> DbResult<Vec<RedemptionRecord>> {
        self.tree
            .iter()
            .values()
            .map(|value| decode(&value?))
            .collect()
    }

    /// The oldest `limit` entries, or `None` if the log is empty.
    pub fn next_batch(&self, limit: usize) -> DbResult<Option<LogBatch>> {
        let mut records = Vec::new();
        let mut through = None;
        for entry in self.tree.iter().take(limit) {
            let (key, value) = entry?;
            through = Some(seq_of(&key));
            records.push(decode(&value)?);
        }
        Ok(through.map(|through| LogBatch { records, through }))
    }

    /// Remove every entry. Only safe when nothing can be appended
    /// concurrently; a submitter should use [`clear_through`](Self::clear_through).
    pub fn clear(&self) -> DbResult<usize> {
        let cleared = self.tree.len();
        self.tree.clear()?;
        self.tree.flush()?;
        info!(entries = cleared, "redemption log cleared");
        Ok(cleared)
    }

    /// Remove every entry up to and including `through`. Entries appended
    /// after the batch was read are kept.
    pub fn clear_through(&self, through: u64) -> DbResult<usize> {
        let mut cleared = 0;
        for key in self.tree.range(..=through.to_be_bytes()).keys() {
            self.tree.remove(key?)?;
            cleared += 1;
        }
        self.tree.flush()?;
        info!(entries = cleared, through, "redemption log cleared");
        Ok(cleared)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// Keys are written by `append` as big-endian `u64`s.
fn seq_of(key: &[u8]) -> u64 {
    <[u8; 8]>::try_from(key)
        .map(u64::from_be_bytes)
        .unwrap_or_default()
}
