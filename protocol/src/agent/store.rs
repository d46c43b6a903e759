//! # AgentStore: on-device persistence
//!
//! The agent device keeps two things on flash: the last cache snapshot
//! (so a reboot in a dead zone does not leave the agent unable to verify)
//! and the redemption log (so a reboot never loses proof of delivery).
//!
//! | Tree          | Key                      | Value                       |
//! |---------------|--------------------------|-----------------------------|
//! | `cache`       | `"snapshot"`             | `bincode(CacheSnapshot)`    |
//! | `redemptions` | `u64` big-endian seq     | `bincode(RedemptionRecord)` |

use std::path::Path;

use sled::{Db, Tree};

use crate::storage::db::{decode, encode};
use crate::storage::DbResult;

use super::cache::CacheSnapshot;
use super::log::RedemptionLog;

const SNAPSHOT_KEY: &[u8] = b"snapshot";

/// sled-backed storage for one agent device.
#[derive(Debug, Clone)]
pub struct AgentStore {
    db: Db,
    cache: Tree,
    redemptions: Tree,
}

impl AgentStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A throwaway store for tests.
    pub fn open_temporary() -> DbResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let cache = db.open_tree("cache")?;
        let redemptions = db.open_tree("redemptions")?;
        Ok(Self {
            db,
            cache,
            redemptions,
        })
    }

    /// Persist the current cache generation, replacing the previous one.
    pub fn save_snapshot(&self, snapshot: &CacheSnapshot) -> DbResult<()> {
        self.cache.insert(SNAPSHOT_KEY, encode(snapshot)?)?;
        self.cache.flush()?;
        Ok(())
    }

    /// The last persisted snapshot, or an empty never-refreshed one.
    pub fn load_snapshot(&self) -> DbResult<CacheSnapshot> {
        match self.cache.get(SNAPSHOT_KEY)? {
            Some(bytes) => decode(&bytes),
            None => Ok(CacheSnapshot::default()),
        }
    }

    /// Handle to the persisted redemption log.
    pub fn redemption_log(&self) -> RedemptionLog {
        RedemptionLog::new(self.db.clone(), self.redemptions.clone())
    }
}
