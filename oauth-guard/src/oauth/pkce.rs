//! PKCE (Proof Key for Code Exchange) support for OAuth 2.0.
//!
//! Implements RFC 7636 verifiers and S256 challenges, plus the random cookie id
//! that binds one PKCE attempt to one `state` value.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::{pkce_error, Error, PkceErrorKind};

/// Prefix of the cookie that carries a PKCE verifier across the redirect.
pub const PKCE_COOKIE_PREFIX: &str = "oauth_pkce_";

const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;
const VERIFIER_RANDOM_BYTES: usize = 64;
const COOKIE_ID_RANDOM_BYTES: usize = 16;
const COOKIE_ID_LEN: usize = COOKIE_ID_RANDOM_BYTES * 2;

/// PKCE code verifier (random string, kept secret by the client).
#[derive(Debug, Clone)]
pub struct CodeVerifier(SecretString);

impl CodeVerifier {
    /// Wrap an existing verifier, rejecting anything outside the RFC 7636 format.
    pub fn parse(verifier: &str) -> Result<Self, Error> {
        if !is_valid_code_verifier(verifier) {
            return Err(pkce_error(
                PkceErrorKind::InvalidVerifier,
                "Invalid PKCE code verifier",
            ));
        }
        Ok(Self(SecretString::new(verifier.to_string())))
    }

    /// Get the verifier string.
    pub fn as_str(&self) -> &str {
        self.0.expose_secret()
    }

    /// Generate the corresponding S256 code challenge.
    pub fn challenge(&self) -> CodeChallenge {
        CodeChallenge::from_verified(self.as_str())
    }
}

/// PKCE code challenge (base64url SHA-256 of the verifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChallenge(String);

impl CodeChallenge {
    /// The only challenge method this crate emits.
    pub const METHOD: &'static str = "S256";

    fn from_verified(verifier: &str) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        Self(URL_SAFE_NO_PAD.encode(digest))
    }

    /// Get the challenge string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Random id naming the cookie that holds one PKCE verifier.
///
/// Independent of the verifier; it only correlates the cookie with the state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PkceCookieId(String);

impl PkceCookieId {
    /// Wrap an existing id, rejecting anything but 32 lowercase hex characters.
    pub fn parse(id: &str) -> Result<Self, Error> {
        if !is_valid_cookie_id(id) {
            return Err(pkce_error(
                PkceErrorKind::InvalidCookieId,
                "Invalid PKCE cookie id",
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the cookie carrying the verifier for this id.
    pub fn cookie_name(&self) -> String {
        cookie_name_for(self)
    }
}

/// Generate a new random PKCE verifier: 64 random bytes, base64url without padding.
///
/// # Panics
///
/// Panics if the encoded value fails the verifier format check. The encoding
/// always yields 86 characters from the allowed alphabet, so this can only
/// fire on a broken build.
pub fn generate_code_verifier() -> CodeVerifier {
    let mut random_bytes = [0u8; VERIFIER_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    let verifier = URL_SAFE_NO_PAD.encode(random_bytes);

    assert!(
        is_valid_code_verifier(&verifier),
        "Generated an invalid PKCE code verifier"
    );

    CodeVerifier(SecretString::new(verifier))
}

/// Check a verifier against `^[A-Za-z0-9\-._~]{43,128}$`.
pub fn is_valid_code_verifier(verifier: &str) -> bool {
    (VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Compute the S256 challenge for a verifier.
///
/// Deterministic so the provider can recompute it when the verifier is
/// presented at code exchange.
pub fn generate_code_challenge(verifier: &str) -> Result<CodeChallenge, Error> {
    if !is_valid_code_verifier(verifier) {
        return Err(pkce_error(
            PkceErrorKind::InvalidVerifier,
            "Invalid PKCE code verifier",
        ));
    }
    Ok(CodeChallenge::from_verified(verifier))
}

/// Generate a new PKCE cookie id: 16 random bytes, lowercase hex.
pub fn generate_cookie_id() -> PkceCookieId {
    let mut random_bytes = [0u8; COOKIE_ID_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    PkceCookieId(hex::encode(random_bytes))
}

/// Check a cookie id against `^[a-f0-9]{32}$`.
pub fn is_valid_cookie_id(id: &str) -> bool {
    id.len() == COOKIE_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Cookie name for a PKCE cookie id.
pub fn cookie_name_for(id: &PkceCookieId) -> String {
    format!("{}{}", PKCE_COOKIE_PREFIX, id.as_str())
}
