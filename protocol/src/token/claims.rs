//! Token header and payload.
//!
//! Field names are camelCase on the wire because payer apps and agent
//! devices already speak that dialect.

use serde::{Deserialize, Serialize};

use crate::config::{TOKEN_ALGORITHM, TOKEN_TYPE};
use crate::order::RedemptionRecord;

/// The token header. There is no key id: the verifier finds the right
/// secret by trying each cached order in turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Signature algorithm. Always `HS256`.
    pub alg: String,
    /// Token type. Tolerated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

impl TokenHeader {
    /// The only header this system issues.
    pub fn hs256() -> Self {
        Self {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: Some(TOKEN_TYPE.to_string()),
        }
    }

    /// `true` if the header declares HS256.
    pub fn is_hs256(&self) -> bool {
        self.alg == TOKEN_ALGORITHM
    }
}

/// What a coin token asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinClaims {
    /// Order the coin pays for.
    pub order_id: String,
    /// Payer.
    pub user_id: String,
    /// Agent expected to scan it.
    pub assigned_agent_id: String,
    /// Coin being spent.
    pub coin_id: String,
    /// Issued-at, Unix seconds.
    #[serde(default)]
    pub iat: i64,
}

impl From<CoinClaims> for RedemptionRecord {
    fn from(claims: CoinClaims) -> Self {
        RedemptionRecord {
            order_id: claims.order_id,
            user_id: claims.user_id,
            assigned_agent_id: claims.assigned_agent_id,
            coin_id: claims.coin_id,
        }
    }
}
