//! Scan envelopes.
//!
//! Payer apps render either the bare token or a small JSON object
//! `{"signedCoin": "<token>"}` into the code. The scanner hands us
//! whichever it read.

use std::borrow::Cow;

use serde::Deserialize;

use crate::config::TOKEN_SEGMENTS;

use super::error::VerifyError;

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "signedCoin", borrow)]
    signed_coin: Cow<'a, str>,
}

/// Pull the compact token out of a scanned payload.
pub fn extract_token(scanned: &str) -> Result<Cow<'_, str>, VerifyError> {
    let scanned = scanned.trim();

    let token = if scanned.starts_with('{') {
        let envelope: Envelope<'_> = serde_json::from_str(scanned)
            .map_err(|_| VerifyError::MalformedToken("unrecognised scan envelope"))?;
        envelope.signed_coin
    } else {
        Cow::Borrowed(scanned)
    };

    if !looks_like_token(&token) {
        return Err(VerifyError::MalformedToken("expected three segments"));
    }
    Ok(token)
}

fn looks_like_token(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.split('.').collect();
    parts.len() == TOKEN_SEGMENTS
        && parts.iter().all(|p| !p.is_empty())
        && !candidate.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_token_passes_through() {
        let token = extract_token("aaa.bbb.ccc\n").unwrap();
        assert_eq!(token, "aaa.bbb.ccc");
        assert!(matches!(token, Cow::Borrowed(_)));
    }

    #[test]
    fn json_envelope_is_unwrapped() {
        let token = extract_token(r#"{"signedCoin":"aaa.bbb.ccc"}"#).unwrap();
        assert_eq!(token, "aaa.bbb.ccc");
    }

    #[test]
    fn anything_else_is_malformed() {
        for bad in [
            "",
            "hello",
            "a..c",
            r#"{"coin":"aaa.bbb.ccc"}"#,
            r#"{"signedCoin":"nope"}"#,
            "{not json",
            "aaa.b b.ccc",
        ] {
            assert!(
                matches!(extract_token(bad), Err(VerifyError::MalformedToken(_))),
                "accepted {:?}",
                bad
            );
        }
    }
}
