//! # Cryptographic Primitives for offcoin
//!
//! Everything the settlement protocol needs from cryptography fits in three
//! small files:
//!
//! - **secret**: per-order 256-bit secrets from a CSPRNG, hex-encoded.
//! - **mac**: HMAC-SHA256 and constant-time tag comparison.
//! - **encoding**: URL-safe, unpadded base64 for the token segments.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. HMAC comes from `hmac`, SHA-256 from `sha2`, the comparison
//! from `subtle`. This module only decides how they are wired together.

pub mod encoding;
pub mod mac;
pub mod secret;

pub use encoding::{b64url_decode, b64url_encode};
pub use mac::{hmac_sha256, tags_equal};
pub use secret::{mint_secret, mint_secret_with, OrderSecret, SecretError};
