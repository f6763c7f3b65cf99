//! Production [`SignatureVerifier`] for the provider's signed-webhook
//! scheme.
//!
//! The provider signs `"{id}.{timestamp}.{body}"` with HMAC-SHA256 keyed by
//! a shared secret and sends the base64 digest in the `svix-signature`
//! header as one or more space-delimited `v1,<base64>` entries. The secret
//! itself is distributed as `whsec_<base64>`; the base64 payload is the raw
//! HMAC key.
//!
//! Verification is timestamp-bounded: the signed `svix-timestamp` must lie
//! within a configurable tolerance of the local clock, which limits replay
//! of captured deliveries.

use super::{EventEnvelope, SignatureVerifier, VerificationError, WebhookHeaders};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Default clock tolerance for the signed timestamp, in seconds.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Decoded HMAC key material; wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SigningKey(Vec<u8>);

/// A [`SignatureVerifier`] backed by the shared signing secret configured
/// at startup.
pub struct SharedSecretVerifier {
    key: SigningKey,
    tolerance_seconds: i64,
}

impl SharedSecretVerifier {
    /// Construct a verifier with the default timestamp tolerance.
    ///
    /// # Arguments
    ///
    /// * `secret` - The shared signing secret, either `whsec_`-prefixed or
    ///   bare base64.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidSecret`] when the base64 payload
    /// of the secret does not decode.
    pub fn new(secret: &str) -> Result<Self, VerificationError> {
        Self::with_tolerance(secret, DEFAULT_TOLERANCE_SECONDS)
    }

    /// Construct a verifier with an explicit timestamp tolerance in
    /// seconds.
    pub fn with_tolerance(secret: &str, tolerance_seconds: i64) -> Result<Self, VerificationError> {
        let trimmed = secret.trim();
        let encoded = trimmed.strip_prefix(SECRET_PREFIX).unwrap_or(trimmed);
        let key = BASE64
            .decode(encoded)
            .map_err(|e| VerificationError::InvalidSecret {
                message: e.to_string(),
            })?;

        Ok(Self {
            key: SigningKey(key),
            tolerance_seconds,
        })
    }

    /// Compute the expected base64 signature over `"{id}.{timestamp}.{body}"`.
    fn expected_signature(&self, message_id: &str, timestamp: &str, body: &[u8]) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key.0)
            .expect("HMAC can take key of any size");

        mac.update(message_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);

        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Reject timestamps that do not parse or fall outside the tolerance
    /// window on either side of the local clock.
    fn check_timestamp(&self, raw: &str) -> Result<(), VerificationError> {
        let signed_at: i64 = raw
            .trim()
            .parse()
            .map_err(|_| VerificationError::InvalidTimestamp)?;

        let skew_seconds = Utc::now().timestamp() - signed_at;
        if skew_seconds.abs() > self.tolerance_seconds {
            return Err(VerificationError::TimestampOutOfTolerance { skew_seconds });
        }

        Ok(())
    }
}

impl std::fmt::Debug for SharedSecretVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretVerifier")
            .field("key", &"<REDACTED>")
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish()
    }
}

#[async_trait]
impl SignatureVerifier for SharedSecretVerifier {
    /// Verify a delivery and parse its body into an [`EventEnvelope`].
    ///
    /// The signature header may carry several space-delimited entries (the
    /// provider includes old signatures during secret rotation); the
    /// delivery is authentic when any `v1` entry matches. Each candidate is
    /// compared in constant time.
    ///
    /// # Errors
    ///
    /// Returns the specific [`VerificationError`] for a stale or malformed
    /// timestamp, a signature mismatch, or a verified body that is not a
    /// valid event envelope. Callers treat all of these identically.
    async fn verify(
        &self,
        body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<EventEnvelope, VerificationError> {
        self.check_timestamp(&headers.timestamp)?;

        let expected = self.expected_signature(&headers.message_id, &headers.timestamp, body);

        let mut matched = false;
        for entry in headers.signature.split_whitespace() {
            let Some((version, candidate)) = entry.split_once(',') else {
                continue;
            };
            if version != SIGNATURE_VERSION {
                continue;
            }
            if bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())) {
                matched = true;
            }
        }

        if !matched {
            return Err(VerificationError::SignatureMismatch);
        }

        serde_json::from_slice(body).map_err(VerificationError::MalformedBody)
    }
}

#[cfg(test)]
#[path = "verifier_tests.rs"]
mod tests;
