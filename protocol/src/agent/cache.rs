//! # Local Order Cache
//!
//! The agent's view of what it is carrying: every Pending Offline order
//! the server handed over on the last sync, secrets included.
//!
//! ## Concurrency
//!
//! The current snapshot sits behind `RwLock<Arc<CacheSnapshot>>`. Readers
//! clone the `Arc` and drop the lock immediately; a refresh builds the new
//! snapshot off to the side and swaps the pointer. A verification that
//! started before a refresh finishes against the snapshot it started with,
//! never a half-replaced one.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::order::Order;

/// One immutable generation of the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    orders: Vec<Order>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    /// Build a snapshot taken at `refreshed_at`.
    pub fn new(orders: Vec<Order>, refreshed_at: DateTime<Utc>) -> Self {
        Self {
            orders,
            refreshed_at: Some(refreshed_at),
        }
    }

    /// Cached orders, in the order the server sent them.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// When this snapshot was pulled. `None` for a device that has never
    /// synced.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Replace-on-refresh snapshot of pending offline orders.
#[derive(Debug, Default)]
pub struct LocalOrderCache {
    current: RwLock<Arc<CacheSnapshot>>,
}

impl LocalOrderCache {
    /// An empty cache that has never been refreshed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously persisted snapshot.
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Replace the whole cache. No merge: orders absent from `orders` are
    /// gone afterwards.
    pub fn refresh(&self, orders: Vec<Order>, clock: &dyn Clock) -> Arc<CacheSnapshot> {
        let snapshot = Arc::new(CacheSnapshot::new(orders, clock.now()));
        *self.current.write() = Arc::clone(&snapshot);
        info!(orders = snapshot.len(), "order cache refreshed");
        snapshot
    }

    /// The current generation. Cheap: one `Arc` clone.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.read().clone()
    }

    /// Every cached order.
    pub fn all(&self) -> Vec<Order> {
        self.snapshot().orders().to_vec()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().refreshed_at()
    }

    /// Time since the last refresh, or `None` if there never was one.
    pub fn age(&self, clock: &dyn Clock) -> Option<ChronoDuration> {
        self.refreshed_at().map(|at| clock.now() - at)
    }

    /// `true` if the cache was never refreshed or is older than `max_age`.
    pub fn is_stale(&self, max_age: std::time::Duration, clock: &dyn Clock) -> bool {
        let max_age = match ChronoDuration::from_std(max_age) {
            Ok(d) => d,
            Err(_) => return false,
        };
        match self.age(clock) {
            Some(age) => age > max_age,
            None => true,
        }
    }
}
