//! # Per-Order Secrets
//!
//! Every Offline order gets its own symmetric key, minted once at order
//! creation and never rotated. The secret signs that order's coin token on
//! the server and verifies it on the agent device.
//!
//! ## Encoding
//!
//! 32 random bytes, hex-encoded to a 64-character lowercase string. The
//! HMAC key is the ASCII text of that string, not the decoded bytes: payer
//! apps and agent devices in the field treat the secret as an opaque
//! string and key their HMAC with it directly.
//!
//! ## Security considerations
//!
//! - Secrets come from the OS RNG unless a caller injects another
//!   `CryptoRng` (tests do).
//! - A failing RNG is an error, never a fallback. No secret, no order.
//! - `Debug` is redacted. If you add logging that prints `expose()`, you
//!   will be asked to leave.

use std::fmt;

use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{SECRET_HEX_LENGTH, SECRET_LENGTH};

/// Errors from secret minting and parsing.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The randomness source could not produce bytes.
    #[error("randomness source failed: {0}")]
    Randomness(String),

    /// A stored or transmitted secret is not 64 hex characters.
    #[error("invalid secret encoding: expected {expected} hex characters")]
    InvalidEncoding {
        /// Required length in characters.
        expected: usize,
    },
}

/// A per-order HMAC key.
///
/// Serializes as the bare hex string so it can travel in the pending-order
/// feed, and validates on the way back in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderSecret(String);

impl OrderSecret {
    /// Parse a hex-encoded secret. The text is kept verbatim because it is
    /// the key material.
    pub fn from_hex(hex_str: &str) -> Result<Self, SecretError> {
        let well_formed = hex_str.len() == SECRET_HEX_LENGTH
            && hex_str.bytes().all(|b| b.is_ascii_hexdigit());
        if !well_formed {
            return Err(SecretError::InvalidEncoding {
                expected: SECRET_HEX_LENGTH,
            });
        }
        Ok(Self(hex_str.to_string()))
    }

    /// The hex text. Only the token minter, the verifier and the wire
    /// layer have any business calling this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// HMAC key bytes (the ASCII bytes of the hex text).
    pub fn key_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for OrderSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OrderSecret(<redacted>)")
    }
}

impl TryFrom<String> for OrderSecret {
    type Error = SecretError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<OrderSecret> for String {
    fn from(secret: OrderSecret) -> Self {
        secret.0
    }
}

/// Mint a fresh secret from the OS RNG.
pub fn mint_secret() -> Result<OrderSecret, SecretError> {
    mint_secret_with(&mut OsRng)
}

/// Mint a fresh secret from the given RNG.
///
/// Uses `try_fill_bytes` so an RNG failure surfaces as
/// [`SecretError::Randomness`] instead of a panic.
pub fn mint_secret_with<R: RngCore + CryptoRng>(rng: &mut R) -> Result<OrderSecret, SecretError> {
    let mut bytes = [0u8; SECRET_LENGTH];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| SecretError::Randomness(e.to_string()))?;
    Ok(OrderSecret(hex::encode(bytes)))
}
