//! # Order Lifecycle
//!
//! Creation and agent assignment. Settlement (the only other transition an
//! order ever makes) lives in [`crate::settlement`].
//!
//! Creation runs in three phases:
//!
//! 1. **Validate**: required fields, lines, quantities. Pure.
//! 2. **Price & mint**: read the catalog, sum the lines with checked
//!    arithmetic, and for Offline orders mint the secret. Still no writes.
//! 3. **Persist**: one sled transaction writes the order and (Offline
//!    only) its coin.
//!
//! Anything that fails in phase 1 or 2 leaves the store untouched.

use chrono::{DateTime, Duration, Utc};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::DEFAULT_DELIVERY_LEAD;
use crate::crypto::mint_secret_with;
use crate::storage::db::COINS_TREE;
use crate::storage::{DbError, OrderDb};

use super::error::OrderError;
use super::types::{Coin, CoinStatus, DeliveryStatus, Order, OrderLine, PaymentMode};

/// How the order's value is determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pricing {
    /// The caller states the value directly.
    Value(u64),
    /// Price each line from the catalog and sum.
    Items(Vec<OrderLine>),
}

/// A validated-on-use request to create an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Caller-chosen id. A UUIDv4 is generated when absent.
    pub order_id: Option<String>,
    /// The payer.
    pub user_id: String,
    /// How the order will be paid.
    pub payment_mode: PaymentMode,
    /// Value or lines.
    pub pricing: Pricing,
    /// Defaults to creation time plus the standard delivery lead.
    pub delivery_date: Option<DateTime<Utc>>,
    /// Agent already known at creation time, if any.
    pub assigned_agent_id: Option<String>,
    /// Caller-chosen coin id for Offline orders. Generated when absent.
    pub coin_id: Option<String>,
}

/// What [`create_order`] persisted.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    /// The stored order.
    pub order: Order,
    /// The coin issued with it. `Some` iff the order is Offline.
    pub coin: Option<Coin>,
}

/// Create an order, minting a secret and coin for Offline orders.
pub fn create_order<R>(
    db: &OrderDb,
    request: &NewOrder,
    rng: &mut R,
    clock: &dyn Clock,
) -> Result<CreatedOrder, OrderError>
where
    R: RngCore + CryptoRng,
{
    validate(request)?;

    let (value, lines) = price(db, &request.pricing)?;
    let now = clock.now();
    let order_id = request
        .order_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // The secret comes before any write. No secret, no order.
    let secret = match request.payment_mode {
        PaymentMode::Offline => Some(mint_secret_with(rng)?),
        _ => None,
    };

    let order = Order {
        order_id: order_id.clone(),
        value,
        delivery_date: request.delivery_date.unwrap_or_else(|| default_delivery_date(now)),
        payment_mode: request.payment_mode,
        delivery_status: DeliveryStatus::Pending,
        user_id: request.user_id.clone(),
        assigned_agent_id: request.assigned_agent_id.clone(),
        secret,
        lines,
        created_at: now,
    };

    let coin = order.is_offline().then(|| Coin {
        coin_id: request
            .coin_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        value,
        user_id: order.user_id.clone(),
        order_id: order_id.clone(),
        status: CoinStatus::Active,
        created_at: now,
    });

    db.insert_order(&order, coin.as_ref()).map_err(|e| match e {
        DbError::Duplicate {
            tree: COINS_TREE,
            key,
        } => OrderError::DuplicateCoin(key),
        DbError::Duplicate { key, .. } => OrderError::DuplicateOrder(key),
        other => OrderError::Storage(other),
    })?;

    info!(
        order_id = %order.order_id,
        user_id = %order.user_id,
        payment_mode = %order.payment_mode,
        value = order.value,
        "order created"
    );

    Ok(CreatedOrder { order, coin })
}

/// Record which agent carries an order.
pub fn assign_agent(db: &OrderDb, order_id: &str, agent_id: &str) -> Result<Order, OrderError> {
    if order_id.trim().is_empty() {
        return Err(OrderError::MissingField("orderId"));
    }
    if agent_id.trim().is_empty() {
        return Err(OrderError::MissingField("assignedAgentId"));
    }

    let order = db.assign_agent(order_id, agent_id).map_err(|e| match e {
        DbError::NotFound(_) => OrderError::NotFound(order_id.to_string()),
        DbError::InvalidState(_) => OrderError::AlreadyDelivered(order_id.to_string()),
        other => OrderError::Storage(other),
    })?;

    info!(order_id, agent_id, "agent assigned");
    Ok(order)
}

fn default_delivery_date(now: DateTime<Utc>) -> DateTime<Utc> {
    // The lead is a small constant; a conversion failure would mean a
    // malformed config, so fall back to "now" rather than panic.
    Duration::from_std(DEFAULT_DELIVERY_LEAD)
        .ok()
        .and_then(|lead| now.checked_add_signed(lead))
        .unwrap_or(now)
}

fn validate(request: &NewOrder) -> Result<(), OrderError> {
    if request.user_id.trim().is_empty() {
        return Err(OrderError::MissingField("userId"));
    }
    if let Some(id) = &request.order_id {
        if id.trim().is_empty() {
            return Err(OrderError::MissingField("orderId"));
        }
    }
    if let Some(id) = &request.coin_id {
        if id.trim().is_empty() {
            return Err(OrderError::MissingField("coinId"));
        }
    }
    if let Some(agent) = &request.assigned_agent_id {
        if agent.trim().is_empty() {
            return Err(OrderError::MissingField("assignedAgentId"));
        }
    }
    if let Pricing::Items(lines) = &request.pricing {
        if lines.is_empty() {
            return Err(OrderError::NoItems);
        }
        for line in lines {
            if line.item_id.trim().is_empty() {
                return Err(OrderError::MissingField("itemId"));
            }
            if line.quantity == 0 {
                return Err(OrderError::ZeroQuantity(line.item_id.clone()));
            }
        }
    }
    Ok(())
}

fn price(db: &OrderDb, pricing: &Pricing) -> Result<(u64, Vec<OrderLine>), OrderError> {
    match pricing {
        Pricing::Value(value) => Ok((*value, Vec::new())),
        Pricing::Items(lines) => {
            let mut total: u64 = 0;
            for line in lines {
                let item = db
                    .get_item(&line.item_id)?
                    .ok_or_else(|| OrderError::UnknownItem(line.item_id.clone()))?;
                let subtotal = item
                    .price
                    .checked_mul(u64::from(line.quantity))
                    .ok_or(OrderError::ValueOverflow)?;
                total = total
                    .checked_add(subtotal)
                    .ok_or(OrderError::ValueOverflow)?;
                debug!(item_id = %item.item_id, quantity = line.quantity, subtotal, "priced line");
            }
            Ok((total, lines.clone()))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
