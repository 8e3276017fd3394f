//! The OAuth `state` parameter.
//!
//! The state is a JSON record `{csrf, returnTo, pkceId?}` carried through the
//! provider redirect as base64 text. Decoding is tolerant of the usual
//! transport mangling (url-safe characters, spaces, dropped padding) but strict
//! about content: a state that cannot bind the callback to its CSRF token and
//! PKCE cookie is rejected outright.

use base64::{
    alphabet,
    engine::{general_purpose::STANDARD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use serde_json::{json, Value};
use sha2::Sha256;

use super::pkce::PkceCookieId;
use crate::error::{state_error, Error, StateErrorKind};

type HmacSha256 = Hmac<Sha256>;

/// Decoder for normalized state strings. Accepts non-canonical trailing bits.
const TOLERANT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const CSRF_TOKEN_RANDOM_BYTES: usize = 16;

/// Decoded OAuth state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthState {
    /// CSRF token, compared against the value stored at authorization start.
    pub csrf: String,
    /// Same-origin path to send the user to after the callback.
    pub return_to: String,
    /// Id of the cookie holding this attempt's PKCE verifier.
    pub pkce_id: Option<PkceCookieId>,
}

impl OAuthState {
    pub fn new(
        csrf: impl Into<String>,
        return_to: impl Into<String>,
        pkce_id: Option<PkceCookieId>,
    ) -> Self {
        Self {
            csrf: csrf.into(),
            return_to: return_to.into(),
            pkce_id,
        }
    }
}

/// Generate a CSRF token for a new authorization attempt: 16 random bytes, hex.
pub fn generate_csrf_token() -> String {
    let mut random_bytes = [0u8; CSRF_TOKEN_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    hex::encode(random_bytes)
}

/// Serialize a state to its transport string (JSON, standard padded base64).
pub fn encode(state: &OAuthState) -> String {
    let mut value = json!({
        "csrf": state.csrf,
        "returnTo": state.return_to,
    });
    if let (Some(pkce_id), Some(object)) = (&state.pkce_id, value.as_object_mut()) {
        object.insert("pkceId".to_string(), Value::from(pkce_id.as_str()));
    }
    STANDARD.encode(value.to_string())
}

/// Decode and validate a state transport string.
///
/// `returnTo` falls back to the legacy `decodedReturnTo` field and is always
/// passed through [`sanitize_return_to`]. A `pkceId` that is present but not a
/// valid cookie id fails the whole state.
pub fn decode(opaque: &str) -> Result<OAuthState, Error> {
    let bytes = TOLERANT
        .decode(normalize_base64(opaque))
        .map_err(|_| malformed("State is not valid base64"))?;

    let value: Value =
        serde_json::from_slice(&bytes).map_err(|_| malformed("State is not valid JSON"))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed("State is not a JSON object"))?;

    let csrf = object
        .get("csrf")
        .and_then(Value::as_str)
        .filter(|csrf| !csrf.is_empty())
        .ok_or_else(|| malformed("State is missing csrf"))?;

    let return_to = object
        .get("returnTo")
        .and_then(Value::as_str)
        .or_else(|| object.get("decodedReturnTo").and_then(Value::as_str))
        .filter(|return_to| !return_to.is_empty())
        .ok_or_else(|| malformed("State is missing returnTo"))?;

    let pkce_id = match object.get("pkceId") {
        None => None,
        Some(raw) => {
            let id = raw
                .as_str()
                .and_then(|id| PkceCookieId::parse(id).ok())
                .ok_or_else(|| malformed("State carries an invalid pkceId"))?;
            Some(id)
        }
    };

    Ok(OAuthState {
        csrf: csrf.to_string(),
        return_to: sanitize_return_to(return_to),
        pkce_id,
    })
}

/// Decode a bare base64 return-to path. Never fails: anything unusable is `/`.
///
/// Only for non-binding round trips such as display hints; callback handlers
/// must use [`decode`].
pub fn decode_return_to_only(opaque: Option<&str>) -> String {
    let Some(opaque) = opaque.filter(|s| !s.is_empty()) else {
        return "/".to_string();
    };

    match TOLERANT.decode(normalize_base64(opaque)) {
        Ok(bytes) => sanitize_return_to(&String::from_utf8_lossy(&bytes)),
        Err(_) => "/".to_string(),
    }
}

/// Compare a received CSRF token with the expected one.
///
/// Returns `false` at once on a length mismatch. Equal-length inputs are
/// compared through HMAC-SHA256 under a one-off random key, so the time taken
/// does not depend on where the inputs first differ.
pub fn verify(received: &str, expected: &str) -> bool {
    if received.len() != expected.len() {
        return false;
    }

    let key: [u8; 32] = rand::thread_rng().gen();
    let Ok(mut expected_mac) = HmacSha256::new_from_slice(&key) else {
        return false;
    };
    let mut received_mac = expected_mac.clone();

    expected_mac.update(expected.as_bytes());
    received_mac.update(received.as_bytes());

    received_mac
        .verify_slice(&expected_mac.finalize().into_bytes())
        .is_ok()
}

/// Reduce a return-to value to a same-origin absolute path, or `/`.
///
/// Protocol-relative (`//host`) and backslash (`/\host`) forms are rejected
/// because browsers resolve both to another origin. So is any value holding a
/// control character or whitespace: browsers drop tab, CR and LF from URLs,
/// which turns `/\t/host` into `//host`.
pub fn sanitize_return_to(return_to: &str) -> String {
    if return_to
        .chars()
        .any(|c| c.is_control() || c.is_whitespace())
    {
        return "/".to_string();
    }
    if !return_to.starts_with('/') || return_to.starts_with("//") || return_to.starts_with("/\\")
    {
        return "/".to_string();
    }
    return_to.to_string()
}

/// Map url-safe and space-mangled base64 back to the standard alphabet and
/// restore padding.
fn normalize_base64(input: &str) -> String {
    // A space may be a form-decoded '+', so only line breaks and tabs are trimmed
    let mut normalized: String = input
        .trim_matches(|c: char| matches!(c, '\r' | '\n' | '\t'))
        .chars()
        .map(|c| match c {
            ' ' | '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    let remainder = normalized.len() % 4;
    if remainder != 0 {
        normalized.push_str(&"=".repeat(4 - remainder));
    }
    normalized
}

fn malformed(message: &str) -> Error {
    state_error(StateErrorKind::Malformed, message)
}
