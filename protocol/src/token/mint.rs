//! # Token Minting
//!
//! `base64url(header) "." base64url(claims) "." base64url(HMAC-SHA256)`.
//!
//! Tokens are minted on demand when the payer asks for their coin and are
//! never stored. Given the same order, coin, secret and clock reading, the
//! output is byte-for-byte identical.

use std::fmt;

use tracing::debug;

use crate::clock::Clock;
use crate::crypto::{b64url_encode, hmac_sha256, OrderSecret};
use crate::order::{Coin, Order};

use super::claims::{CoinClaims, TokenHeader};
use super::error::MintError;

/// A signed coin token, ready to be rendered as a scannable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinToken(String);

impl CoinToken {
    /// The compact token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take ownership of the token text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CoinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sign a coin token for `order` with `secret`.
///
/// Refused unless the order is Offline, has an assigned agent and `coin`
/// was issued for it.
pub fn mint_token(
    order: &Order,
    coin: &Coin,
    secret: &OrderSecret,
    clock: &dyn Clock,
) -> Result<CoinToken, MintError> {
    if !order.is_offline() {
        return Err(MintError::NotOffline(order.order_id.clone()));
    }
    let agent = order
        .assigned_agent_id
        .as_ref()
        .ok_or_else(|| MintError::NoAgent(order.order_id.clone()))?;
    if coin.order_id != order.order_id {
        return Err(MintError::CoinMismatch {
            coin_id: coin.coin_id.clone(),
            order_id: order.order_id.clone(),
        });
    }

    let claims = CoinClaims {
        order_id: order.order_id.clone(),
        user_id: order.user_id.clone(),
        assigned_agent_id: agent.clone(),
        coin_id: coin.coin_id.clone(),
        iat: clock.unix_seconds(),
    };

    let header = b64url_encode(serde_json::to_vec(&TokenHeader::hs256())?);
    let payload = b64url_encode(serde_json::to_vec(&claims)?);
    let signing_input = format!("{}.{}", header, payload);
    let signature = hmac_sha256(secret.key_bytes(), signing_input.as_bytes());

    debug!(order_id = %order.order_id, coin_id = %coin.coin_id, "token minted");

    Ok(CoinToken(format!(
        "{}.{}",
        signing_input,
        b64url_encode(signature)
    )))
}
