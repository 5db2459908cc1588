//! Stripe Webhook Verification
//!
//! Authenticates a raw webhook body against the `Stripe-Signature` header and
//! turns it into a typed [`BillingEvent`].

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::BillingConfig;
use crate::error::WebhookError;
use crate::event::BillingEvent;

type HmacSha256 = Hmac<Sha256>;

/// Signatures stamped this far in the future are still accepted
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Every `v1` entry; Stripe sends several while a secret is being rolled
    pub v1: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut v1 = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::InvalidSignature("invalid header format".into()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        WebhookError::InvalidSignature("invalid timestamp".into())
                    })?);
                }
                "v1" => {
                    // A garbled entry cannot match; skip it and let the others try
                    if let Ok(bytes) = hex::decode(value) {
                        v1.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::InvalidSignature("missing timestamp".into()))?;
        if v1.is_empty() {
            return Err(WebhookError::InvalidSignature("missing v1 signature".into()));
        }

        Ok(Self { timestamp, v1 })
    }
}

/// Checks webhook signatures with the configured signing secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(config: &BillingConfig) -> Self {
        Self {
            secret: config.webhook_secret.clone(),
            tolerance_secs: config.signature_tolerance_secs,
        }
    }

    /// Authenticate `payload` and decode it.
    ///
    /// Signature problems come back as [`WebhookError::InvalidSignature`];
    /// authentic bodies can still fail as unrecognized or malformed.
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<BillingEvent, WebhookError> {
        self.authenticate(payload, signature_header, now)?;
        BillingEvent::decode(payload)
    }

    /// Signature and freshness check only
    pub fn authenticate(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        if signature_header.trim().is_empty() {
            return Err(WebhookError::InvalidSignature("missing signature header".into()));
        }

        let header = SignatureHeader::parse(signature_header)?;

        let age = now
            .timestamp()
            .checked_sub(header.timestamp)
            .ok_or_else(|| WebhookError::InvalidSignature("timestamp out of range".into()))?;
        if age > self.tolerance_secs {
            return Err(WebhookError::InvalidSignature(format!(
                "timestamp too old ({age}s)"
            )));
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::InvalidSignature(
                "timestamp in the future".into(),
            ));
        }

        let expected = compute_signature(&self.secret, header.timestamp, payload)?;
        let matched = header
            .v1
            .iter()
            .any(|candidate| candidate.len() == expected.len() && bool::from(candidate.ct_eq(&expected)));

        if matched {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature("signature mismatch".into()))
        }
    }
}

fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::InvalidSignature(format!("signing key: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build a `Stripe-Signature` header value for `payload`.
///
/// Used by fixtures and local tooling that replay events.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let signature = compute_signature(secret, timestamp, payload)
        .map(hex::encode)
        .unwrap_or_default();
    format!("t={timestamp},v1={signature}")
}
