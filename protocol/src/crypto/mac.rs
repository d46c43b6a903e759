//! # HMAC-SHA256
//!
//! The token signature is `HMAC-SHA256(secret, header "." payload)`. The
//! verifier recomputes it once per cached order, so both halves live here:
//! computing the tag and comparing two tags without leaking where they
//! first differ.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::SIGNATURE_LENGTH;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over `message` keyed with `key`.
///
/// HMAC accepts keys of any length (long keys are pre-hashed, short keys
/// zero-padded), so there is no error path here.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(message);
    let mut output = [0u8; SIGNATURE_LENGTH];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// Constant-time equality for authentication tags.
///
/// A length mismatch returns `false` immediately; the length of a tag is
/// public, its contents are not.
pub fn tags_equal(expected: &[u8], actual: &[u8]) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    expected.ct_eq(actual).into()
}
