//! # Agent Device
//!
//! Everything an agent's handset does for offline settlement, owned by one
//! value that is passed around explicitly: the order cache, the redemption
//! log, the persistent store behind both, and the clock.
//!
//! Interested parties (a UI, a background submitter) subscribe to
//! [`DeviceEvent`]s instead of polling.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::CACHE_STALE_AFTER;
use crate::order::{Order, RedemptionRecord};
use crate::storage::DbError;
use crate::token::{extract_token, verify_against, VerifyError};

use super::cache::LocalOrderCache;
use super::log::{LogBatch, RedemptionLog};
use super::store::AgentStore;

/// Event channel depth. Slow subscribers miss old events, never block us.
const EVENT_CAPACITY: usize = 64;

/// Errors from device operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The scanned code did not verify.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// On-device storage failed.
    #[error("device storage error: {0}")]
    Storage(#[from] DbError),
}

/// Something the device did that observers may care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The cache was replaced with a fresh pull.
    CacheRefreshed {
        /// Orders now cached.
        orders: usize,
        /// Pull time.
        at: DateTime<Utc>,
    },
    /// A scanned token verified and was logged.
    RedemptionLogged(RedemptionRecord),
    /// A submitted batch was confirmed and removed from the log.
    LogCleared {
        /// Entries removed.
        entries: usize,
    },
}

/// One agent handset.
pub struct AgentDevice {
    store: AgentStore,
    cache: LocalOrderCache,
    log: RedemptionLog,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<DeviceEvent>,
}

impl AgentDevice {
    /// Bring up a device on `store`, restoring the last cache snapshot.
    pub fn open(store: AgentStore, clock: Arc<dyn Clock>) -> Result<Self, AgentError> {
        let snapshot = store.load_snapshot()?;
        let log = store.redemption_log();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!(
            cached_orders = snapshot.len(),
            pending_redemptions = log.len(),
            "agent device opened"
        );

        Ok(Self {
            cache: LocalOrderCache::from_snapshot(snapshot),
            store,
            log,
            clock,
            events,
        })
    }

    /// Listen for device events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Replace the cache with a fresh pending-order pull and persist it.
    pub fn refresh(&self, orders: Vec<Order>) -> Result<usize, AgentError> {
        let snapshot = self.cache.refresh(orders, self.clock.as_ref());
        self.store.save_snapshot(&snapshot)?;

        let count = snapshot.len();
        self.emit(DeviceEvent::CacheRefreshed {
            orders: count,
            at: snapshot.refreshed_at().unwrap_or_else(|| self.clock.now()),
        });
        Ok(count)
    }

    /// Verify a scanned code offline and log the redemption.
    ///
    /// Verification runs against the snapshot current at the moment of the
    /// call, even if a refresh lands halfway through.
    pub fn scan(&self, scanned: &str) -> Result<RedemptionRecord, AgentError> {
        let token = extract_token(scanned)?;
        let snapshot = self.cache.snapshot();

        if self.cache.is_stale(CACHE_STALE_AFTER, self.clock.as_ref()) {
            warn!("verifying against a stale order cache");
        }

        let record = verify_against(&token, &snapshot)?;
        self.log.append(&record)?;

        info!(order_id = %record.order_id, coin_id = %record.coin_id, "redemption accepted");
        self.emit(DeviceEvent::RedemptionLogged(record.clone()));
        Ok(record)
    }

    /// Everything logged and not yet confirmed by the server.
    pub fn pending_submission(&self) -> Result<Vec<RedemptionRecord>, AgentError> {
        Ok(self.log.drain()?)
    }

    /// The oldest unconfirmed entries, at most `limit` of them.
    pub fn next_submission(&self, limit: usize) -> Result<Option<LogBatch>, AgentError> {
        Ok(self.log.next_batch(limit)?)
    }

    /// The server accepted `batch`: forget exactly those entries. Scans
    /// logged after the batch was read stay pending.
    pub fn confirm_submitted(&self, batch: &LogBatch) -> Result<usize, AgentError> {
        let entries = self.log.clear_through(batch.through)?;
        self.emit(DeviceEvent::LogCleared { entries });
        Ok(entries)
    }

    /// Time since the last cache refresh.
    pub fn cache_age(&self) -> Option<ChronoDuration> {
        self.cache.age(self.clock.as_ref())
    }

    pub fn cached_orders(&self) -> Vec<Order> {
        self.cache.all()
    }

    pub fn cache(&self) -> &LocalOrderCache {
        &self.cache
    }

    fn emit(&self, event: DeviceEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::MAX_RECONCILE_BATCH;
    use crate::crypto::mint_secret;
    use crate::order::{Coin, CoinStatus, DeliveryStatus, PaymentMode};
    use crate::token::mint_token;

    fn fixture() -> (Order, String) {
        let secret = mint_secret().unwrap();
        let order = Order {
            order_id: "ORD-1".into(),
            value: 500,
            delivery_date: Utc::now(),
            payment_mode: PaymentMode::Offline,
            delivery_status: DeliveryStatus::Pending,
            user_id: "U-1".into(),
            assigned_agent_id: Some("A-1".into()),
            secret: Some(secret.clone()),
            lines: Vec::new(),
            created_at: Utc::now(),
        };
        let coin = Coin {
            coin_id: "CN-1".into(),
            value: 500,
            user_id: "U-1".into(),
            order_id: "ORD-1".into(),
            status: CoinStatus::Active,
            created_at: Utc::now(),
        };
        let token = mint_token(&order, &coin, &secret, &ManualClock::at_unix(0))
            .unwrap()
            .into_string();
        (order, token)
    }

    fn device(clock: Arc<ManualClock>) -> AgentDevice {
        AgentDevice::open(AgentStore::open_temporary().unwrap(), clock).unwrap()
    }

    #[test]
    fn scan_logs_and_notifies() {
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let device = device(clock);
        let mut events = device.subscribe();
        let (order, token) = fixture();

        device.refresh(vec![order]).unwrap();
        let record = device.scan(&token).unwrap();

        assert_eq!(device.pending_submission().unwrap(), vec![record.clone()]);
        assert!(matches!(
            events.try_recv().unwrap(),
            DeviceEvent::CacheRefreshed { orders: 1, .. }
        ));
        assert_eq!(
            events.try_recv().unwrap(),
            DeviceEvent::RedemptionLogged(record)
        );
    }

    #[test]
    fn failed_scan_logs_nothing() {
        let device = device(Arc::new(ManualClock::at_unix(0)));
        let (_order, token) = fixture();

        assert!(matches!(
            device.scan(&token),
            Err(AgentError::Verify(VerifyError::Unverified))
        ));
        assert!(matches!(
            device.scan("garbage"),
            Err(AgentError::Verify(VerifyError::MalformedToken(_)))
        ));
        assert!(device.pending_submission().unwrap().is_empty());
    }

    #[test]
    fn envelope_scans_are_accepted() {
        let device = device(Arc::new(ManualClock::at_unix(0)));
        let (order, token) = fixture();
        device.refresh(vec![order]).unwrap();

        let wrapped = serde_json::json!({ "signedCoin": token }).to_string();
        assert_eq!(device.scan(&wrapped).unwrap().coin_id, "CN-1");
    }

    #[test]
    fn confirm_clears_and_reports() {
        let device = device(Arc::new(ManualClock::at_unix(0)));
        let (order, token) = fixture();
        device.refresh(vec![order]).unwrap();
        device.scan(&token).unwrap();
        device.scan(&token).unwrap();

        let batch = device.next_submission(MAX_RECONCILE_BATCH).unwrap().unwrap();
        let mut events = device.subscribe();
        assert_eq!(device.confirm_submitted(&batch).unwrap(), 2);
        assert_eq!(
            events.try_recv().unwrap(),
            DeviceEvent::LogCleared { entries: 2 }
        );
        assert!(device.pending_submission().unwrap().is_empty());
        assert!(device.next_submission(MAX_RECONCILE_BATCH).unwrap().is_none());
    }

    #[test]
    fn scan_during_submission_is_not_lost() {
        let device = device(Arc::new(ManualClock::at_unix(0)));
        let (order, token) = fixture();
        device.refresh(vec![order]).unwrap();
        device.scan(&token).unwrap();

        let in_flight = device.next_submission(MAX_RECONCILE_BATCH).unwrap().unwrap();
        assert_eq!(in_flight.len(), 1);

        // The agent scans again while the upload is in flight.
        let late = device.scan(&token).unwrap();

        assert_eq!(device.confirm_submitted(&in_flight).unwrap(), 1);
        assert_eq!(device.pending_submission().unwrap(), vec![late]);
    }

    #[test]
    fn oversized_log_splits_into_bounded_batches() {
        let store = AgentStore::open_temporary().unwrap();
        let log = store.redemption_log();
        let device = AgentDevice::open(store, Arc::new(ManualClock::at_unix(0))).unwrap();

        let total = MAX_RECONCILE_BATCH + 5;
        for i in 0..total {
            log.append(&RedemptionRecord {
                order_id: format!("ORD-{}", i),
                user_id: "U-1".into(),
                assigned_agent_id: "A-1".into(),
                coin_id: format!("CN-{}", i),
            })
            .unwrap();
        }

        let mut sizes = Vec::new();
        while let Some(batch) = device.next_submission(MAX_RECONCILE_BATCH).unwrap() {
            crate::settlement::validate_batch(&batch.records).unwrap();
            sizes.push(batch.len());
            device.confirm_submitted(&batch).unwrap();
        }
        assert_eq!(sizes, vec![MAX_RECONCILE_BATCH, 5]);
        assert!(device.pending_submission().unwrap().is_empty());
    }

    #[test]
    fn cache_age_tracks_injected_clock() {
        let clock = Arc::new(ManualClock::at_unix(0));
        let device = device(Arc::clone(&clock));
        assert!(device.cache_age().is_none());

        device.refresh(Vec::new()).unwrap();
        clock.advance(ChronoDuration::minutes(5));
        assert_eq!(device.cache_age(), Some(ChronoDuration::minutes(5)));
    }

    #[test]
    fn cache_and_log_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::at_unix(0));
        let (order, token) = fixture();
        {
            let device = AgentDevice::open(AgentStore::open(dir.path()).unwrap(), clock.clone())
                .unwrap();
            device.refresh(vec![order]).unwrap();
            device.scan(&token).unwrap();
        }

        let device = AgentDevice::open(AgentStore::open(dir.path()).unwrap(), clock).unwrap();
        assert_eq!(device.cached_orders().len(), 1);
        assert_eq!(device.pending_submission().unwrap().len(), 1);
        // The restored cache still verifies.
        assert!(device.scan(&token).is_ok());
    }
}
