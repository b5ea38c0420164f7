//! HMAC-SHA256 verification of payment processor webhook deliveries.
//!
//! The processor sends a `Stripe-Signature` header of the form
//! `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`. Each `v1` value is
//! `HMAC-SHA256(secret, "<t>.<raw body>")`; more than one may be present while
//! a secret is being rolled. A delivery is trusted when any `v1` matches and
//! the timestamp is within the configured tolerance.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::utils::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("no signature matches the payload")]
    Mismatch,
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        AppError::InvalidSignature(err.to_string())
    }
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    let parsed = value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::Malformed("invalid timestamp".into()))?;
                    timestamp = Some(parsed);
                }
                "v1" => {
                    let bytes = hex::decode(value)
                        .map_err(|e| SignatureError::Malformed(format!("invalid hex: {e}")))?;
                    candidates.push(bytes);
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| SignatureError::Malformed("missing timestamp".into()))?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed("missing v1 signature".into()));
        }
        let tolerance = u64::try_from(self.tolerance_secs).unwrap_or(0);
        if now.abs_diff(timestamp) > tolerance {
            return Err(SignatureError::Expired);
        }

        let expected = self.compute(timestamp, payload);
        if candidates
            .iter()
            .any(|candidate| bool::from(expected.ct_eq(candidate.as_slice())))
        {
            Ok(())
        } else {
            tracing::warn!("webhook signature verification failed");
            Err(SignatureError::Mismatch)
        }
    }

    /// Produces a header value the way the processor would. Used by tests and
    /// local tooling that replays deliveries.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        format!(
            "t={timestamp},v1={}",
            hex::encode(self.compute(timestamp, payload))
        )
    }

    fn compute(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_767_225_600;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from("whsec_test"), 300)
    }

    #[test]
    fn test_valid_signature() {
        let v = verifier();
        let payload = br#"{"id":"evt_1"}"#;
        let header = v.sign(payload, NOW);

        assert_eq!(v.verify_at(payload, Some(&header), NOW + 10), Ok(()));
    }

    #[test]
    fn test_signature_from_other_secret_is_rejected() {
        let other = WebhookVerifier::new(SecretString::from("whsec_other"), 300);
        let payload = b"{}";
        let header = other.sign(payload, NOW);

        assert_eq!(
            verifier().verify_at(payload, Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let v = verifier();
        let header = v.sign(br#"{"amount":100}"#, NOW);

        assert_eq!(
            v.verify_at(br#"{"amount":1}"#, Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let v = verifier();
        let payload = b"rolled";
        let good = v.sign(payload, NOW);
        let good_sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1={},v1={good_sig}", "00".repeat(32));

        assert_eq!(v.verify_at(payload, Some(&header), NOW), Ok(()));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let v = verifier();
        let header = v.sign(b"late", NOW);

        assert_eq!(
            v.verify_at(b"late", Some(&header), NOW + 301),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_extreme_timestamps_are_expired() {
        let v = verifier();
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1={}", "00".repeat(32));
            assert_eq!(
                v.verify_at(b"{}", Some(&header), NOW),
                Err(SignatureError::Expired)
            );
        }
        assert_eq!(
            v.verify(b"{}", Some("t=-9223372036854775808,v1=00")),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let v = verifier();
        assert_eq!(v.verify_at(b"x", None, NOW), Err(SignatureError::MissingHeader));
        assert!(matches!(
            v.verify_at(b"x", Some("v1=abcd"), NOW),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            v.verify_at(b"x", Some(&format!("t={NOW}")), NOW),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            v.verify_at(b"x", Some(&format!("t={NOW},v1=zz")), NOW),
            Err(SignatureError::Malformed(_))
        ));
    }
}
