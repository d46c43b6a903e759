//! Core type definitions for orders, coins and redemptions.
//!
//! These are the records the server stores and the agent reasons about.
//! Monetary values are `u64` in the smallest currency unit; nothing here
//! ever divides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::OrderSecret;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How the payer settles an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMode {
    /// Paid online before dispatch.
    PrePaid,
    /// Cash handed to the agent at the door.
    CashOnDelivery,
    /// Settled by scanning the payer's coin token, possibly with no network.
    Offline,
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrePaid => write!(f, "PrePaid"),
            Self::CashOnDelivery => write!(f, "CashOnDelivery"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Delivery lifecycle. One transition only: `Pending -> Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Not yet proven delivered.
    Pending,
    /// Delivery proven and reconciled.
    Delivered,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Delivered => write!(f, "Delivered"),
        }
    }
}

/// Coin lifecycle. One transition only: `Active -> Inactive`, coupled to
/// the order's `Pending -> Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinStatus {
    /// Redeemable.
    Active,
    /// Spent.
    #[serde(alias = "InActive")]
    Inactive,
}

impl fmt::Display for CoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Inactive => write!(f, "Inactive"),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A catalog entry used to price orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique item identifier.
    pub item_id: String,
    /// Display name.
    pub name: String,
    /// Unit price in the smallest currency unit.
    pub price: u64,
}

/// One line of an order: which item and how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    /// Catalog item identifier.
    pub item_id: String,
    /// Units ordered. Must be at least 1.
    pub quantity: u32,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A delivery order as held by the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub order_id: String,
    /// Order value in the smallest currency unit.
    pub value: u64,
    /// Promised delivery date.
    pub delivery_date: DateTime<Utc>,
    /// How the order is paid.
    pub payment_mode: PaymentMode,
    /// Delivery lifecycle state.
    pub delivery_status: DeliveryStatus,
    /// The payer.
    pub user_id: String,
    /// The delivery agent carrying the order, once assigned.
    pub assigned_agent_id: Option<String>,
    /// HMAC key for the coin token. Present iff `payment_mode == Offline`.
    pub secret: Option<OrderSecret>,
    /// Priced lines. Empty when the value was supplied directly.
    pub lines: Vec<OrderLine>,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// `true` for orders settled with a coin token.
    pub fn is_offline(&self) -> bool {
        self.payment_mode == PaymentMode::Offline
    }

    /// `true` while the order still awaits delivery.
    pub fn is_pending(&self) -> bool {
        self.delivery_status == DeliveryStatus::Pending
    }

    /// `true` when the user and assigned agent both match.
    pub fn held_by(&self, user_id: &str, agent_id: &str) -> bool {
        self.user_id == user_id && self.assigned_agent_id.as_deref() == Some(agent_id)
    }
}

// ---------------------------------------------------------------------------
// Coin
// ---------------------------------------------------------------------------

/// The redeemable unit tied 1:1 to an Offline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Unique coin identifier.
    pub coin_id: String,
    /// Equal to the order's value.
    pub value: u64,
    /// The payer who holds the coin.
    pub user_id: String,
    /// The Offline order this coin pays for.
    pub order_id: String,
    /// Redeemable or spent.
    pub status: CoinStatus,
    /// When the coin was issued (same transaction as its order).
    pub created_at: DateTime<Utc>,
}

impl Coin {
    /// `true` while the coin can still be redeemed.
    pub fn is_active(&self) -> bool {
        self.status == CoinStatus::Active
    }
}

// ---------------------------------------------------------------------------
// Redemption Record
// ---------------------------------------------------------------------------

/// Proof, logged on the agent device, that a valid token for a pending
/// order was scanned. Submitted later for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRecord {
    /// Order the token was minted for.
    pub order_id: String,
    /// Payer.
    pub user_id: String,
    /// Agent who scanned it.
    pub assigned_agent_id: String,
    /// Coin being redeemed.
    pub coin_id: String,
}

impl RedemptionRecord {
    /// Name of the first empty field, if any.
    pub fn first_empty_field(&self) -> Option<&'static str> {
        [
            ("orderId", &self.order_id),
            ("userId", &self.user_id),
            ("assignedAgentId", &self.assigned_agent_id),
            ("coinId", &self.coin_id),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

impl fmt::Display for RedemptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order={} user={} agent={} coin={}",
            self.order_id, self.user_id, self.assigned_agent_id, self.coin_id
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
