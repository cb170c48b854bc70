//! PKCE (RFC 7636) proof-key material and CSRF state nonces.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes behind a code verifier (86 base64url characters).
const VERIFIER_BYTES: usize = 64;

/// Random bytes behind a state nonce.
const STATE_BYTES: usize = 32;

/// The only challenge method this client sends.
pub const CHALLENGE_METHOD: &str = "S256";

/// PKCE code verifier and challenge pair.
///
/// The challenge is always derived from the verifier; the verifier leaves the
/// process only inside the token exchange request body.
#[derive(Clone)]
pub struct PkceMaterial {
    verifier: String,
    challenge: String,
}

impl PkceMaterial {
    /// Generate a new verifier/challenge pair from the thread CSPRNG.
    pub fn generate() -> Self {
        let mut verifier_bytes = [0u8; VERIFIER_BYTES];
        rand::rng().fill_bytes(&mut verifier_bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(verifier_bytes))
    }

    /// Derive the S256 challenge for an existing verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = derive_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// The challenge sent on the authorization request.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// The challenge method (always `S256`).
    pub fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }

    pub(crate) fn verifier(&self) -> &str {
        &self.verifier
    }
}

impl std::fmt::Debug for PkceMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceMaterial")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// `base64url_nopad(sha256(verifier))`.
fn derive_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state string for CSRF protection.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}
