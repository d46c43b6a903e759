//! # Protocol Configuration & Constants
//!
//! Every magic number in offcoin lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! The token constants are part of the wire format: agent devices in the
//! field verify tokens with exactly these values, so changing them is a
//! compatibility break, not a refactor.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The crate-level protocol version reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Raw entropy per order secret, in bytes. 256 bits, matching the SHA-256
/// output size.
pub const SECRET_LENGTH: usize = 32;

/// Length of the hex-encoded secret. Two characters per byte.
pub const SECRET_HEX_LENGTH: usize = SECRET_LENGTH * 2;

// ---------------------------------------------------------------------------
// Token Format
// ---------------------------------------------------------------------------

/// `alg` value carried in every token header.
pub const TOKEN_ALGORITHM: &str = "HS256";

/// `typ` value carried in every token header.
pub const TOKEN_TYPE: &str = "JWT";

/// Number of dot-separated segments in a token: header, payload, signature.
pub const TOKEN_SEGMENTS: usize = 3;

/// HMAC-SHA256 digest length in bytes.
pub const SIGNATURE_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Default time between order placement and the promised delivery date.
pub const DEFAULT_DELIVERY_LEAD: Duration = Duration::from_secs(4 * 24 * 60 * 60);

/// Upper bound on records accepted in a single reconciliation batch. A full
/// day of offline deliveries for one agent fits comfortably.
pub const MAX_RECONCILE_BATCH: usize = 1_000;

/// Age after which an agent's cached order snapshot is reported as stale.
/// Stale caches still verify; the age is surfaced so the UI can nag.
pub const CACHE_STALE_AFTER: Duration = Duration::from_secs(12 * 60 * 60);

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 8000;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 8001;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_lengths_agree() {
        assert_eq!(SECRET_HEX_LENGTH, 2 * SECRET_LENGTH);
        assert_eq!(SECRET_LENGTH, 32);
    }

    #[test]
    fn test_token_constants() {
        assert_eq!(TOKEN_ALGORITHM, "HS256");
        assert_eq!(TOKEN_SEGMENTS, 3);
        assert_eq!(SIGNATURE_LENGTH, 32);
    }

    #[test]
    fn test_ports_are_distinct() {
        assert_ne!(DEFAULT_API_PORT, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn test_delivery_lead_is_four_days() {
        assert_eq!(DEFAULT_DELIVERY_LEAD.as_secs(), 345_600);
        assert!(CACHE_STALE_AFTER < DEFAULT_DELIVERY_LEAD);
    }
}
