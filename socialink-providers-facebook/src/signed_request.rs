//! Verification of the `signed_request` parameter posted by Facebook's embedded widgets.
//!
//! The format is `base64url(signature).base64url(payload)` where the signature is the
//! HMAC-SHA256 of the encoded payload segment, keyed with the application secret.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

/// How long a signed request stays valid after `issued_at`, in seconds.
pub const FRESHNESS_WINDOW_SECS: i64 = 86_400;

/// Decoded content of a signed request.
pub type Claims = serde_json::Map<String, Value>;

type HmacSha256 = Hmac<Sha256>;

/// Reasons a signed request is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// The input is not two base64url segments around a JSON object.
    #[error("malformed signed request: {0}")]
    Malformed(String),
    /// The signature does not match the payload.
    #[error("signature mismatch")]
    SignatureMismatch,
    /// `issued_at` is outside the freshness window.
    #[error("signed request expired")]
    Expired,
}

/// Verify a signed request and return its claims.
pub fn verify(
    signed_request: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<Claims, VerificationError> {
    let (sig_part, payload_part) = signed_request
        .split_once('.')
        .ok_or_else(|| VerificationError::Malformed("missing separator".into()))?;

    let signature = base64_url_decode(sig_part)?;
    let payload = base64_url_decode(payload_part)?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| VerificationError::Malformed(format!("invalid payload: {e}")))?;

    // The MAC covers the encoded segment, not the decoded JSON.
    let mut mac = new_mac(secret);
    mac.update(payload_part.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| VerificationError::SignatureMismatch)?;

    let issued_at = claims
        .get("issued_at")
        .and_then(epoch_seconds)
        .ok_or_else(|| VerificationError::Malformed("missing issued_at".into()))?;

    if issued_at <= now.timestamp() - FRESHNESS_WINDOW_SECS {
        return Err(VerificationError::Expired);
    }

    Ok(claims)
}

/// Produce a signed request for `claims`, in the format [`verify`] accepts.
pub fn sign(claims: &Claims, secret: &[u8]) -> String {
    let payload = URL_SAFE_NO_PAD.encode(Value::Object(claims.clone()).to_string());
    let mut mac = new_mac(secret);
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{signature}.{payload}")
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size")
}

/// Decode base64url, restoring the `=` padding Facebook strips.
fn base64_url_decode(segment: &str) -> Result<Vec<u8>, VerificationError> {
    let mut padded = String::with_capacity(segment.len() + 3);
    padded.push_str(segment);
    let remainder = segment.len() % 4;
    if remainder != 0 {
        padded.push_str(&"=".repeat(4 - remainder));
    }
    URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| VerificationError::Malformed(format!("invalid base64: {e}")))
}

fn epoch_seconds(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs.floor() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    const SECRET: &[u8] = b"app-secret";

    fn claims(issued_at: i64) -> Claims {
        match json!({
            "algorithm": "HMAC-SHA256",
            "issued_at": issued_at,
            "user_id": "42",
            "oauth_token": "widget-token",
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn sign_then_verify_returns_claims() {
        let now = Utc::now();
        let claims = claims(now.timestamp() - 60);
        let signed = sign(&claims, SECRET);

        assert_eq!(verify(&signed, SECRET, now).unwrap(), claims);
    }

    #[test]
    fn flipped_signature_byte_is_rejected() {
        let now = Utc::now();
        let signed = sign(&claims(now.timestamp()), SECRET);
        let (sig, payload) = signed.split_once('.').unwrap();

        let mut raw = URL_SAFE_NO_PAD.decode(sig).unwrap();
        for index in [0, raw.len() / 2, raw.len() - 1] {
            raw[index] ^= 0x01;
            let tampered = format!("{}.{payload}", URL_SAFE_NO_PAD.encode(&raw));
            assert_eq!(
                verify(&tampered, SECRET, now),
                Err(VerificationError::SignatureMismatch)
            );
            raw[index] ^= 0x01;
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let signed = sign(&claims(now.timestamp()), SECRET);
        assert_eq!(
            verify(&signed, b"other-secret", now),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn freshness_window_boundaries() {
        let now = Utc::now();
        let ts = now.timestamp();

        let stale = sign(&claims(ts - FRESHNESS_WINDOW_SECS - 1), SECRET);
        assert_eq!(verify(&stale, SECRET, now), Err(VerificationError::Expired));

        let exactly_a_day = sign(&claims(ts - FRESHNESS_WINDOW_SECS), SECRET);
        assert_eq!(
            verify(&exactly_a_day, SECRET, now),
            Err(VerificationError::Expired)
        );

        let fresh = sign(&claims(ts - FRESHNESS_WINDOW_SECS + 1), SECRET);
        assert!(verify(&fresh, SECRET, now).is_ok());
    }

    #[test]
    fn verification_uses_the_supplied_clock() {
        let issued = Utc::now() - Duration::days(3);
        let signed = sign(&claims(issued.timestamp()), SECRET);

        assert!(verify(&signed, SECRET, issued + Duration::hours(1)).is_ok());
        assert_eq!(
            verify(&signed, SECRET, issued + Duration::hours(25)),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn padded_segments_are_accepted() {
        let now = Utc::now();
        let signed = sign(&claims(now.timestamp()), SECRET);
        let (sig, payload) = signed.split_once('.').unwrap();

        // 32-byte signatures encode to 43 characters, one short of a padded block.
        assert_eq!(sig.len(), 43);
        let padded_sig = format!("{sig}=");
        assert!(verify(&format!("{padded_sig}.{payload}"), SECRET, now).is_ok());
    }

    #[test]
    fn malformed_inputs() {
        let now = Utc::now();
        let cases = [
            "no-separator-here",
            "!!!.e30",
            "c2ln.%%%",
            // "sig" . "not json"
            "c2ln.bm90IGpzb24",
        ];
        for input in cases {
            assert!(
                matches!(
                    verify(input, SECRET, now),
                    Err(VerificationError::Malformed(_))
                ),
                "{input} should be malformed"
            );
        }
    }

    #[test]
    fn missing_issued_at_is_malformed() {
        let mut claims = claims(0);
        claims.remove("issued_at");
        let signed = sign(&claims, SECRET);
        assert!(matches!(
            verify(&signed, SECRET, Utc::now()),
            Err(VerificationError::Malformed(_))
        ));
    }

    #[test]
    fn only_first_separator_splits() {
        let now = Utc::now();
        let signed = sign(&claims(now.timestamp()), SECRET);
        // A trailing segment becomes part of the payload and breaks decoding.
        assert!(verify(&format!("{signed}.extra"), SECRET, now).is_err());
    }
}
