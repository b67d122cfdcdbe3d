//! Processor webhook verification.
//!
//! The signature covers the exact bytes received, so verification must run
//! on the raw body before any JSON parsing.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed delivery, in seconds.
pub const TOLERANCE_SECS: i64 = 300;

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Webhook secret is not configured")]
    NotConfigured,
    #[error("Missing signature header")]
    MissingHeader,
    #[error("Signature header has no timestamp")]
    MissingTimestamp,
    #[error("Signature header has no v1 signature")]
    MissingSignature,
    #[error("Signature timestamp outside tolerance")]
    Expired,
    #[error("No signatures found matching the expected signature")]
    Mismatch,
    #[error("Webhook secret is not a valid HMAC key")]
    InvalidSecret,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: Value,
}

impl WebhookEvent {
    /// Id of the payment intent the event refers to.
    pub fn intent_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(Value::as_str)
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn compute_signature(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against the raw payload.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: Option<&str>,
    now: i64,
) -> Result<(), SignatureError> {
    let secret = secret.ok_or(SignatureError::NotConfigured)?;
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }
    if (now - timestamp).abs() > TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let expected = compute_signature(secret, timestamp, payload)?;
    let matched = signatures.iter().any(|candidate| {
        candidate.len() == expected.len()
            && bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;

    fn header_for(body: &[u8], secret: &str, timestamp: i64) -> String {
        format!(
            "t={},v1={}",
            timestamp,
            compute_signature(secret, timestamp, body).unwrap()
        )
    }

    #[test]
    fn accepts_valid_signature() {
        let header = header_for(BODY, SECRET, NOW);
        assert_eq!(verify_signature(BODY, Some(&header), Some(SECRET), NOW), Ok(()));
    }

    #[test]
    fn accepts_when_any_v1_matches() {
        let valid = compute_signature(SECRET, NOW, BODY).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v0=ignored,v1={valid}");
        assert_eq!(verify_signature(BODY, Some(&header), Some(SECRET), NOW), Ok(()));
    }

    #[test]
    fn rejects_tampered_body() {
        let header = header_for(BODY, SECRET, NOW);
        let tampered = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_2"}}}"#;
        assert_eq!(
            verify_signature(tampered, Some(&header), Some(SECRET), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = header_for(BODY, "whsec_other", NOW);
        assert_eq!(
            verify_signature(BODY, Some(&header), Some(SECRET), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = header_for(BODY, SECRET, NOW - TOLERANCE_SECS - 1);
        assert_eq!(
            verify_signature(BODY, Some(&header), Some(SECRET), NOW),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(
            verify_signature(BODY, None, Some(SECRET), NOW),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verify_signature(BODY, Some("v1=abc"), Some(SECRET), NOW),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verify_signature(BODY, Some("t=1700000000"), Some(SECRET), NOW),
            Err(SignatureError::MissingSignature)
        );
    }

    #[test]
    fn rejects_everything_without_secret() {
        let header = header_for(BODY, SECRET, NOW);
        assert_eq!(
            verify_signature(BODY, Some(&header), None, NOW),
            Err(SignatureError::NotConfigured)
        );
    }

    #[test]
    fn extracts_intent_id_from_event() {
        let event: WebhookEvent = serde_json::from_slice(BODY).unwrap();
        assert_eq!(event.event_type, PAYMENT_SUCCEEDED);
        assert_eq!(event.intent_id(), Some("pi_1"));
    }
}
