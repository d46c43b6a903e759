//! # Orders
//!
//! Orders, coins and the records that tie a scanned token back to them.
//!
//! An Offline order is born with a secret and a coin. It stays Pending
//! until a redemption for it is reconciled, at which point the order flips
//! to Delivered and the coin to Inactive in the same transaction. Nothing
//! ever flips back.

pub mod error;
pub mod lifecycle;
pub mod types;

pub use error::OrderError;
pub use lifecycle::{assign_agent, create_order, CreatedOrder, NewOrder, Pricing};
pub use types::{
    Coin, CoinStatus, DeliveryStatus, Item, Order, OrderLine, PaymentMode, RedemptionRecord,
};
