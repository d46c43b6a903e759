//! Errors for order creation and agent assignment.

use thiserror::Error;

use crate::crypto::SecretError;
use crate::storage::DbError;

/// Everything that can stop an order from being created or assigned.
///
/// Validation variants are raised before the store is touched.
#[derive(Debug, Error)]
pub enum OrderError {
    /// A required text field is empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The request gave both a value and item lines, or neither.
    #[error("exactly one of value or items is required")]
    PricingRequired,

    /// An item-priced order arrived with no lines.
    #[error("at least one item is required")]
    NoItems,

    /// A line asked for zero units.
    #[error("quantity must be at least 1 for item {0}")]
    ZeroQuantity(String),

    /// A line names an item the catalog does not know.
    #[error("invalid item selected: {0}")]
    UnknownItem(String),

    /// The computed order value does not fit in a `u64`.
    #[error("order value overflows")]
    ValueOverflow,

    /// An order with this identifier already exists.
    #[error("order already exists: {0}")]
    DuplicateOrder(String),

    /// A coin with this identifier already exists.
    #[error("coin already exists: {0}")]
    DuplicateCoin(String),

    /// No order with this identifier exists.
    #[error("order not found: {0}")]
    NotFound(String),

    /// The order is already delivered and can no longer change hands.
    #[error("order {0} is already delivered")]
    AlreadyDelivered(String),

    /// The secret could not be minted. Fatal: nothing was written.
    #[error("secret generation failed: {0}")]
    Secret(#[from] SecretError),

    /// The store failed underneath us.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}
