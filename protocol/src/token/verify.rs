//! # Offline Verification
//!
//! Runs on the agent device with no network. The header carries no key
//! id, so the only way to find the signing secret is to try every cached
//! order's secret until one reproduces the signature. That is O(n) HMACs
//! per scan; n is the number of orders one agent carries in a day, so it
//! stays cheap.
//!
//! The payload is only decoded after a signature match. An attacker who
//! edits the payload therefore never gets as far as claim comparison, and
//! every failure past the shape checks collapses into `Unverified`.

use tracing::debug;

use crate::agent::{CacheSnapshot, LocalOrderCache};
use crate::config::TOKEN_SEGMENTS;
use crate::crypto::{b64url_decode, hmac_sha256, tags_equal};
use crate::order::{Order, RedemptionRecord};

use super::claims::{CoinClaims, TokenHeader};
use super::error::VerifyError;

/// A token split into its segments, with the cheap checks done.
struct SplitToken<'a> {
    /// `header "." payload`, exactly as received.
    signing_input: &'a str,
    /// The still-encoded payload segment.
    payload: &'a str,
    /// Decoded signature bytes.
    signature: Vec<u8>,
}

impl<'a> SplitToken<'a> {
    fn parse(token: &'a str) -> Result<Self, VerifyError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != TOKEN_SEGMENTS {
            return Err(VerifyError::MalformedToken("expected three segments"));
        }

        let header_bytes = b64url_decode(parts[0])
            .map_err(|_| VerifyError::MalformedToken("header is not base64url"))?;
        let header: TokenHeader = serde_json::from_slice(&header_bytes)
            .map_err(|_| VerifyError::MalformedToken("header is not valid JSON"))?;
        if !header.is_hs256() {
            return Err(VerifyError::MalformedToken("unsupported algorithm"));
        }

        let signature = b64url_decode(parts[2])
            .map_err(|_| VerifyError::MalformedToken("signature is not base64url"))?;

        // Both separators are present, so this cannot miss.
        let signing_len = parts[0].len() + 1 + parts[1].len();
        Ok(Self {
            signing_input: &token[..signing_len],
            payload: parts[1],
            signature,
        })
    }
}

/// Verify `token` against the cache's current snapshot.
pub fn verify(token: &str, cache: &LocalOrderCache) -> Result<RedemptionRecord, VerifyError> {
    let snapshot = cache.snapshot();
    verify_against(token, &snapshot)
}

/// Verify `token` against one fixed snapshot. Pure; nothing is mutated.
pub fn verify_against(
    token: &str,
    snapshot: &CacheSnapshot,
) -> Result<RedemptionRecord, VerifyError> {
    let split = SplitToken::parse(token.trim())?;

    for order in snapshot.orders() {
        let secret = match &order.secret {
            Some(secret) => secret,
            None => continue,
        };

        let expected = hmac_sha256(secret.key_bytes(), split.signing_input.as_bytes());
        if !tags_equal(&expected, &split.signature) {
            continue;
        }

        // Signature matched. A payload that will not decode or whose claims
        // disagree with this order is not a match; keep looking.
        let claims = match decode_claims(split.payload) {
            Some(claims) => claims,
            None => continue,
        };
        if claims_match(&claims, order) {
            debug!(order_id = %claims.order_id, coin_id = %claims.coin_id, "token verified");
            return Ok(claims.into());
        }
    }

    debug!(cached_orders = snapshot.len(), "token not verified");
    Err(VerifyError::Unverified)
}

fn decode_claims(payload: &str) -> Option<CoinClaims> {
    let bytes = b64url_decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn claims_match(claims: &CoinClaims, order: &Order) -> bool {
    claims.order_id == order.order_id
        && order.held_by(&claims.user_id, &claims.assigned_agent_id)
        && !claims.coin_id.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::{b64url_encode, mint_secret, OrderSecret};
    use crate::order::{Coin, CoinStatus, DeliveryStatus, PaymentMode};
    use crate::token::mint_token;
    use chrono::Utc;

    fn order(id: &str, agent: Option<&str>, secret: &OrderSecret) -> Order {
        Order {
            order_id: id.into(),
            value: 500,
            delivery_date: Utc::now(),
            payment_mode: PaymentMode::Offline,
            delivery_status: DeliveryStatus::Pending,
            user_id: "U-1".into(),
            assigned_agent_id: agent.map(str::to_string),
            secret: Some(secret.clone()),
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn coin(id: &str, order_id: &str) -> Coin {
        Coin {
            coin_id: id.into(),
            value: 500,
            user_id: "U-1".into(),
            order_id: order_id.into(),
            status: CoinStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn snapshot(orders: Vec<Order>) -> CacheSnapshot {
        CacheSnapshot::new(orders, Utc::now())
    }

    fn minted(order: &Order, coin_id: &str) -> String {
        let secret = order.secret.as_ref().unwrap();
        mint_token(
            order,
            &coin(coin_id, &order.order_id),
            secret,
            &ManualClock::at_unix(1_700_000_000),
        )
        .unwrap()
        .into_string()
    }

    #[test]
    fn accepts_token_for_cached_order() {
        let secret = mint_secret().unwrap();
        let ord = order("ORD-1", Some("A-1"), &secret);
        let token = minted(&ord, "CN-1");

        let record = verify_against(&token, &snapshot(vec![ord])).unwrap();
        assert_eq!(record.order_id, "ORD-1");
        assert_eq!(record.user_id, "U-1");
        assert_eq!(record.assigned_agent_id, "A-1");
        assert_eq!(record.coin_id, "CN-1");
    }

    #[test]
    fn finds_the_right_order_among_many() {
        let orders: Vec<Order> = (0..20)
            .map(|i| order(&format!("ORD-{}", i), Some("A-1"), &mint_secret().unwrap()))
            .collect();
        let token = minted(&orders[13], "CN-13");

        let record = verify_against(&token, &snapshot(orders)).unwrap();
        assert_eq!(record.order_id, "ORD-13");
    }

    #[test]
    fn rejects_when_order_not_cached() {
        let ord = order("ORD-1", Some("A-1"), &mint_secret().unwrap());
        let token = minted(&ord, "CN-1");
        let other = order("ORD-2", Some("A-1"), &mint_secret().unwrap());

        assert_eq!(
            verify_against(&token, &snapshot(vec![other])),
            Err(VerifyError::Unverified)
        );
        assert_eq!(
            verify_against(&token, &CacheSnapshot::default()),
            Err(VerifyError::Unverified)
        );
    }

    #[test]
    fn rejects_when_cached_agent_differs() {
        let secret = mint_secret().unwrap();
        let minted_for = order("ORD-1", Some("A-1"), &secret);
        let token = minted(&minted_for, "CN-1");

        let reassigned = order("ORD-1", Some("A-2"), &secret);
        assert_eq!(
            verify_against(&token, &snapshot(vec![reassigned])),
            Err(VerifyError::Unverified)
        );

        let unassigned = order("ORD-1", None, &secret);
        assert_eq!(
            verify_against(&token, &snapshot(vec![unassigned])),
            Err(VerifyError::Unverified)
        );
    }

    #[test]
    fn rejects_forged_claims_under_a_valid_secret() {
        // Signed correctly, but the claims name a different order.
        let secret = mint_secret().unwrap();
        let ord = order("ORD-1", Some("A-1"), &secret);
        let header = b64url_encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = b64url_encode(
            br#"{"orderId":"ORD-9","userId":"U-1","assignedAgentId":"A-1","coinId":"CN-1","iat":0}"#,
        );
        let input = format!("{}.{}", header, payload);
        let sig = b64url_encode(hmac_sha256(secret.key_bytes(), input.as_bytes()));
        let token = format!("{}.{}", input, sig);

        assert_eq!(
            verify_against(&token, &snapshot(vec![ord])),
            Err(VerifyError::Unverified)
        );
    }

    #[test]
    fn rejects_empty_coin_id() {
        let secret = mint_secret().unwrap();
        let ord = order("ORD-1", Some("A-1"), &secret);
        let token = minted(&ord, "");
        assert_eq!(
            verify_against(&token, &snapshot(vec![ord])),
            Err(VerifyError::Unverified)
        );
    }

    #[test]
    fn shape_errors_are_malformed() {
        let snap = CacheSnapshot::default();
        for bad in ["", "abc", "a.b", "a.b.c.d"] {
            assert!(matches!(
                verify_against(bad, &snap),
                Err(VerifyError::MalformedToken(_))
            ));
        }

        let header = b64url_encode(br#"{"alg":"none"}"#);
        let none_alg = format!("{}.e30.", header);
        assert_eq!(
            verify_against(&none_alg, &snap),
            Err(VerifyError::MalformedToken("unsupported algorithm"))
        );

        let good_header = b64url_encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let bad_sig = format!("{}.e30.not*base64", good_header);
        assert_eq!(
            verify_against(&bad_sig, &snap),
            Err(VerifyError::MalformedToken("signature is not base64url"))
        );
    }

    #[test]
    fn verify_reads_the_cache_snapshot() {
        let secret = mint_secret().unwrap();
        let ord = order("ORD-1", Some("A-1"), &secret);
        let token = minted(&ord, "CN-1");
        let cache = LocalOrderCache::new();
        let clock = ManualClock::at_unix(0);

        assert_eq!(verify(&token, &cache), Err(VerifyError::Unverified));
        cache.refresh(vec![ord], &clock);
        assert!(verify(&token, &cache).is_ok());
        // Idempotent: verifying again changes nothing.
        assert!(verify(&token, &cache).is_ok());
    }
}
