//! Payment provider webhook signature verification.
//!
//! The provider signs each delivery with HMAC-SHA256 over the raw request body
//! and sends the lowercase hex digest in the `X-Signature` header. Verification
//! must run against the exact bytes received, before any JSON parsing.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Verifies `provided_signature` against the HMAC-SHA256 of `raw_body`.
///
/// Returns `false` for any mismatch or malformed input (empty, non-hex, wrong
/// length). Never panics on attacker-controlled data.
pub fn verify(raw_body: &[u8], provided_signature: &str, secret: &[u8]) -> bool {
    let provided = match hex::decode(provided_signature.trim()) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => return false,
    };

    let mut mac = match Hmac::<Sha256>::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();

    constant_time_compare(&expected, &provided)
}

/// Holds the shared webhook secret for the lifetime of the process.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    /// Creates a verifier. The secret is validated at startup by configuration.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
        }
    }

    /// Verifies a delivery against the configured secret.
    pub fn verify(&self, raw_body: &[u8], provided_signature: &str) -> bool {
        verify(
            raw_body,
            provided_signature,
            self.secret.expose_secret().as_bytes(),
        )
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Constant-time comparison; length mismatch short-circuits.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes the hex signature a provider would send, for test fixtures.
pub fn compute_signature(secret: &str, raw_body: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}
