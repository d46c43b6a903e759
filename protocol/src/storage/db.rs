//! # OrderDb: Persistent Storage Engine
//!
//! The server's authoritative store, built on sled's embedded key-value
//! store. Every order, coin and catalog item lives here.
//!
//! ## Tree Layout
//!
//! | Tree          | Key                   | Value              |
//! |---------------|-----------------------|--------------------|
//! | `items`       | `item_id` (UTF-8)     | `bincode(Item)`    |
//! | `orders`      | `order_id` (UTF-8)    | `bincode(Order)`   |
//! | `coins`       | `coin_id` (UTF-8)     | `bincode(Coin)`    |
//! | `order_coins` | `order_id` (UTF-8)    | `coin_id` (UTF-8)  |
//!
//! ## Atomicity
//!
//! Anything that touches an order and its coin together runs inside a
//! sled multi-tree transaction. sled transactions are serializable and
//! retried on conflict, so a read-check-write sequence inside one closure
//! can never interleave with another writer touching the same keys. The
//! closure may run more than once; keep it free of side effects.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use crate::order::{Coin, DeliveryStatus, Item, Order};

pub const ITEMS_TREE: &str = "items";
pub const ORDERS_TREE: &str = "orders";
pub const COINS_TREE: &str = "coins";
pub const ORDER_COINS_TREE: &str = "order_coins";

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("duplicate key in {tree}: {key}")]
    Duplicate { tree: &'static str, key: String },

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<TransactionError<DbError>> for DbError {
    fn from(err: TransactionError<DbError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => DbError::Sled(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec helpers
// ---------------------------------------------------------------------------

pub(crate) fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Abort the surrounding transaction with `err`.
pub(crate) fn abort<T>(err: DbError) -> ConflictableTransactionResult<T, DbError> {
    Err(ConflictableTransactionError::Abort(err))
}

/// `encode` for use inside a transaction closure.
pub(crate) fn tx_encode<T: Serialize>(value: &T) -> ConflictableTransactionResult<Vec<u8>, DbError> {
    encode(value).map_err(ConflictableTransactionError::Abort)
}

/// `decode` for use inside a transaction closure.
pub(crate) fn tx_decode<T: DeserializeOwned>(
    bytes: &[u8],
) -> ConflictableTransactionResult<T, DbError> {
    decode(bytes).map_err(ConflictableTransactionError::Abort)
}

// ---------------------------------------------------------------------------
// OrderDb
// ---------------------------------------------------------------------------

/// Persistent storage engine for orders, coins and the item catalog.
///
/// # Thread Safety
///
/// sled is inherently thread-safe. `OrderDb` is cheap to clone (all trees
/// are reference-counted handles) and can be shared via `Arc<OrderDb>`
/// without external synchronization.
#[derive(Debug, Clone)]
pub struct OrderDb {
    /// The underlying sled database handle.
    db: Db,
    /// Catalog items by id.
    items: Tree,
    /// Orders by id.
    orders: Tree,
    /// Coins by id.
    coins: Tree,
    /// Reverse index: order id -> coin id.
    order_coins: Tree,
}

impl OrderDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is cleaned up automatically when
    /// dropped. Ideal for unit tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let items = db.open_tree(ITEMS_TREE)?;
        let orders = db.open_tree(ORDERS_TREE)?;
        let coins = db.open_tree(COINS_TREE)?;
        let order_coins = db.open_tree(ORDER_COINS_TREE)?;

        Ok(Self {
            db,
            items,
            orders,
            coins,
            order_coins,
        })
    }

    // -- Catalog ------------------------------------------------------------

    /// Insert or replace a catalog item.
    pub fn put_item(&self, item: &Item) -> DbResult<()> {
        self.items.insert(item.item_id.as_bytes(), encode(item)?)?;
        Ok(())
    }

    /// Look up a catalog item.
    pub fn get_item(&self, item_id: &str) -> DbResult<Option<Item>> {
        match self.items.get(item_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // -- Orders & coins -----------------------------------------------------

    /// Persist a new order and, for Offline orders, its coin, atomically.
    ///
    /// Fails with [`DbError::Duplicate`] if the order id or the coin id is
    /// already taken. Nothing is written in that case.
    pub fn insert_order(&self, order: &Order, coin: Option<&Coin>) -> DbResult<()> {
        let order_bytes = encode(order)?;
        let coin_bytes = coin.map(encode).transpose()?;

        (&self.orders, &self.coins, &self.order_coins)
            .transaction(|(orders, coins, order_coins)| {
                if orders.get(order.order_id.as_bytes())?.is_some() {
                    return abort(DbError::Duplicate {
                        tree: ORDERS_TREE,
                        key: order.order_id.clone(),
                    });
                }
                if let (Some(coin), Some(bytes)) = (coin, coin_bytes.as_ref()) {
                    if coins.get(coin.coin_id.as_bytes())?.is_some() {
                        return abort(DbError::Duplicate {
                            tree: COINS_TREE,
                            key: coin.coin_id.clone(),
                        });
                    }
                    coins.insert(coin.coin_id.as_bytes(), bytes.as_slice())?;
                    order_coins.insert(order.order_id.as_bytes(), coin.coin_id.as_bytes())?;
                }
                orders.insert(order.order_id.as_bytes(), order_bytes.as_slice())?;
                Ok(())
            })?;

        self.db.flush()?;
        Ok(())
    }

    /// Retrieve an order by id.
    pub fn get_order(&self, order_id: &str) -> DbResult<Option<Order>> {
        match self.orders.get(order_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve a coin by id.
    pub fn get_coin(&self, coin_id: &str) -> DbResult<Option<Coin>> {
        match self.coins.get(coin_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve the coin issued for an order, if it has one.
    pub fn coin_for_order(&self, order_id: &str) -> DbResult<Option<Coin>> {
        match self.order_coins.get(order_id.as_bytes())? {
            Some(coin_id) => {
                let coin_id = String::from_utf8(coin_id.to_vec())
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                self.get_coin(&coin_id)
            }
            None => Ok(None),
        }
    }

    /// Record which agent carries an order. Allowed while the order is
    /// Pending, including re-assignment.
    pub fn assign_agent(&self, order_id: &str, agent_id: &str) -> DbResult<Order> {
        let updated = self.orders.transaction(|orders| {
            let mut order: Order = match orders.get(order_id.as_bytes())? {
                Some(bytes) => tx_decode(&bytes)?,
                None => return abort(DbError::NotFound(format!("order {}", order_id))),
            };
            if order.delivery_status == DeliveryStatus::Delivered {
                return abort(DbError::InvalidState(format!(
                    "order {} is delivered",
                    order_id
                )));
            }
            order.assigned_agent_id = Some(agent_id.to_string());
            orders.insert(order_id.as_bytes(), tx_encode(&order)?)?;
            Ok(order)
        })?;

        self.db.flush()?;
        Ok(updated)
    }

    /// Every Pending Offline order, optionally only those assigned to one
    /// agent. Sorted by order id (sled key order).
    pub fn pending_offline_orders(&self, agent_id: Option<&str>) -> DbResult<Vec<Order>> {
        self.scan_orders(|order| {
            order.is_offline()
                && order.is_pending()
                && agent_id.map_or(true, |a| order.assigned_agent_id.as_deref() == Some(a))
        })
    }

    /// Every order placed by one user.
    pub fn orders_for_user(&self, user_id: &str) -> DbResult<Vec<Order>> {
        self.scan_orders(|order| order.user_id == user_id)
    }

    fn scan_orders(&self, keep: impl Fn(&Order) -> bool) -> DbResult<Vec<Order>> {
        let mut out = Vec::new();
        for entry in self.orders.iter() {
            let (_key, value) = entry?;
            let order: Order = decode(&value)?;
            if keep(&order) {
                out.push(order);
            }
        }
        Ok(out)
    }

    /// Run `f` as one serializable transaction over the `orders` and
    /// `coins` trees.
    pub(crate) fn transact_order_and_coin<A, F>(&self, f: F) -> DbResult<A>
    where
        F: Fn(&TransactionalTree, &TransactionalTree) -> ConflictableTransactionResult<A, DbError>,
    {
        let result = (&self.orders, &self.coins).transaction(|(orders, coins)| f(orders, coins))?;
        Ok(result)
    }

    // -- Utility operations -------------------------------------------------

    /// Number of orders stored.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Number of coins stored.
    pub fn coin_count(&self) -> usize {
        self.coins.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{CoinStatus, PaymentMode};
    use chrono::Utc;

    fn make_order(id: &str, mode: PaymentMode, agent: Option<&str>) -> Order {
        Order {
            order_id: id.to_string(),
            value: 500,
            delivery_date: Utc::now(),
            payment_mode: mode,
            delivery_status: DeliveryStatus::Pending,
            user_id: "U-1".to_string(),
            assigned_agent_id: agent.map(str::to_string),
            secret: None,
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn make_coin(id: &str, order_id: &str) -> Coin {
        Coin {
            coin_id: id.to_string(),
            value: 500,
            user_id: "U-1".to_string(),
            order_id: order_id.to_string(),
            status: CoinStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn open_temporary_database() {
        let db = OrderDb::open_temporary().expect("should create temp db");
        assert_eq!(db.order_count(), 0);
        assert_eq!(db.coin_count(), 0);
    }

    #[test]
    fn open_persistent_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = OrderDb::open(dir.path()).expect("open");
            let order = make_order("ORD-1", PaymentMode::Offline, Some("A-1"));
            db.insert_order(&order, Some(&make_coin("CN-1", "ORD-1")))
                .unwrap();
        }
        let db = OrderDb::open(dir.path()).expect("reopen");
        assert!(db.get_order("ORD-1").unwrap().is_some());
        assert_eq!(db.coin_for_order("ORD-1").unwrap().unwrap().coin_id, "CN-1");
    }

    #[test]
    fn item_crud() {
        let db = OrderDb::open_temporary().unwrap();
        assert!(db.get_item("ITM-1").unwrap().is_none());

        let item = Item {
            item_id: "ITM-1".into(),
            name: "Kettle".into(),
            price: 2_499,
        };
        db.put_item(&item).unwrap();
        assert_eq!(db.get_item("ITM-1").unwrap(), Some(item));
    }

    #[test]
    fn insert_order_with_coin_indexes_both_ways() {
        let db = OrderDb::open_temporary().unwrap();
        let order = make_order("ORD-1", PaymentMode::Offline, Some("A-1"));
        let coin = make_coin("CN-1", "ORD-1");

        db.insert_order(&order, Some(&coin)).unwrap();

        assert_eq!(db.get_order("ORD-1").unwrap(), Some(order));
        assert_eq!(db.get_coin("CN-1").unwrap(), Some(coin.clone()));
        assert_eq!(db.coin_for_order("ORD-1").unwrap(), Some(coin));
    }

    #[test]
    fn duplicate_order_is_rejected_without_writing_coin() {
        let db = OrderDb::open_temporary().unwrap();
        let order = make_order("ORD-1", PaymentMode::Offline, None);
        db.insert_order(&order, Some(&make_coin("CN-1", "ORD-1")))
            .unwrap();

        let result = db.insert_order(&order, Some(&make_coin("CN-2", "ORD-1")));
        assert!(matches!(result, Err(DbError::Duplicate { .. })));
        assert!(db.get_coin("CN-2").unwrap().is_none());
        assert_eq!(db.coin_count(), 1);
    }

    #[test]
    fn duplicate_coin_id_rolls_back_the_order() {
        let db = OrderDb::open_temporary().unwrap();
        db.insert_order(
            &make_order("ORD-1", PaymentMode::Offline, None),
            Some(&make_coin("CN-1", "ORD-1")),
        )
        .unwrap();

        let result = db.insert_order(
            &make_order("ORD-2", PaymentMode::Offline, None),
            Some(&make_coin("CN-1", "ORD-2")),
        );
        assert!(matches!(result, Err(DbError::Duplicate { .. })));
        assert!(db.get_order("ORD-2").unwrap().is_none());
    }

    #[test]
    fn assign_agent_updates_pending_orders_only() {
        let db = OrderDb::open_temporary().unwrap();
        db.insert_order(&make_order("ORD-1", PaymentMode::Offline, None), None)
            .unwrap();

        let updated = db.assign_agent("ORD-1", "A-9").unwrap();
        assert_eq!(updated.assigned_agent_id.as_deref(), Some("A-9"));

        let mut delivered = make_order("ORD-2", PaymentMode::Offline, Some("A-1"));
        delivered.delivery_status = DeliveryStatus::Delivered;
        db.insert_order(&delivered, None).unwrap();
        assert!(matches!(
            db.assign_agent("ORD-2", "A-9"),
            Err(DbError::InvalidState(_))
        ));
        assert!(matches!(
            db.assign_agent("ORD-404", "A-9"),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn pending_feed_filters_mode_status_and_agent() {
        let db = OrderDb::open_temporary().unwrap();
        db.insert_order(&make_order("ORD-1", PaymentMode::Offline, Some("A-1")), None)
            .unwrap();
        db.insert_order(&make_order("ORD-2", PaymentMode::Offline, Some("A-2")), None)
            .unwrap();
        db.insert_order(&make_order("ORD-3", PaymentMode::PrePaid, Some("A-1")), None)
            .unwrap();
        let mut done = make_order("ORD-4", PaymentMode::Offline, Some("A-1"));
        done.delivery_status = DeliveryStatus::Delivered;
        db.insert_order(&done, None).unwrap();

        let all: Vec<String> = db
            .pending_offline_orders(None)
            .unwrap()
            .into_iter()
            .map(|o| o.order_id)
            .collect();
        assert_eq!(all, vec!["ORD-1", "ORD-2"]);

        let mine = db.pending_offline_orders(Some("A-1")).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].order_id, "ORD-1");
    }

    #[test]
    fn orders_for_user_scans_by_owner() {
        let db = OrderDb::open_temporary().unwrap();
        db.insert_order(&make_order("ORD-1", PaymentMode::Offline, None), None)
            .unwrap();
        let mut other = make_order("ORD-2", PaymentMode::PrePaid, None);
        other.user_id = "U-2".into();
        db.insert_order(&other, None).unwrap();

        assert_eq!(db.orders_for_user("U-1").unwrap().len(), 1);
        assert_eq!(db.orders_for_user("U-2").unwrap().len(), 1);
        assert!(db.orders_for_user("U-3").unwrap().is_empty());
    }

    #[test]
    fn flush_does_not_error() {
        let db = OrderDb::open_temporary().unwrap();
        db.flush().unwrap();
    }
}
