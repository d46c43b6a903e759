//! Token errors.

use thiserror::Error;

/// Why a scanned token was not accepted.
///
/// Deliberately coarse. A token for an order missing from the cache, a
/// token signed with the wrong secret and a token whose claims disagree
/// with the cached order all look the same from the outside.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The input is not shaped like a token at all.
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),

    /// Well-formed, but no cached order vouches for it.
    #[error("token could not be verified against any cached order")]
    Unverified,
}

/// Why the server refused to mint a token.
#[derive(Debug, Error)]
pub enum MintError {
    /// Only Offline orders are settled with coin tokens.
    #[error("order {0} is not an offline order")]
    NotOffline(String),

    /// The token binds the agent, so there must be one.
    #[error("order {0} has no assigned agent")]
    NoAgent(String),

    /// The coin was issued for a different order.
    #[error("coin {coin_id} does not belong to order {order_id}")]
    CoinMismatch {
        /// The coin offered.
        coin_id: String,
        /// The order it was offered for.
        order_id: String,
    },

    /// Claims could not be serialized.
    #[error("token encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
