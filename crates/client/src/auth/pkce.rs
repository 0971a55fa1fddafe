//! PKCE (Proof Key for Code Exchange) pair generation.
//!
//! Implements the RFC 7636 S256 method: the verifier is 32 bytes of
//! cryptographically secure random data, URL-safe base64 without padding, and
//! the challenge is the base64url-encoded SHA-256 digest of the verifier's
//! string form (the encoded ASCII bytes, not the raw random bytes).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes in a verifier; encodes to 43 characters.
const VERIFIER_BYTES: usize = 32;

/// A verifier/challenge pair for one authorization attempt.
///
/// Generated fresh per attempt and never persisted; the verifier must be
/// retained by the caller until code-exchange time.
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Random secret, sent to the token endpoint at exchange time.
    pub verifier: String,

    /// SHA-256 commitment to the verifier, sent in the authorization request.
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = challenge_for(&verifier);
        Self { verifier, challenge }
    }

    /// The challenge method, always `S256`.
    #[must_use]
    pub fn method(&self) -> &'static str {
        "S256"
    }
}

/// Compute the S256 challenge for a verifier string.
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
