//! URL-safe base64 without padding, the encoding of every token segment.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, DecodeError, Engine as _};

/// Encode bytes as unpadded base64url.
pub fn b64url_encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode unpadded base64url. Padding, standard-alphabet characters and
/// non-canonical trailing bits are all rejected.
pub fn b64url_decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD.decode(input)
}
