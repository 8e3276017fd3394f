//! Callback-side checks tying the returned `state` to the browser that started the flow.

use tracing::warn;

use super::pkce::{CodeVerifier, PkceCookieId};
use super::state;
use crate::cookies::get_cookie;
use crate::error::{pkce_error, state_error, Error, PkceErrorKind, StateErrorKind};

/// Default name of the cookie holding the CSRF token set at authorization start.
pub const CSRF_COOKIE_NAME: &str = "csrf-token";

/// What a callback handler may trust once [`verify_callback`] succeeds.
#[derive(Debug, Clone)]
pub struct CallbackBinding {
    /// Sanitized same-origin path to redirect to.
    pub return_to: String,
    /// Id from the state, if the attempt used PKCE.
    pub pkce_id: Option<PkceCookieId>,
    /// Verifier read from the PKCE cookie named by `pkce_id`.
    pub code_verifier: Option<CodeVerifier>,
}

/// Decode the `state` query parameter and check it against the request cookies.
///
/// # Arguments
///
/// * `encoded_state` - The raw `state` query parameter
/// * `cookie_header` - The request's `Cookie` header, if any
/// * `csrf_cookie_name` - Name of the cookie holding the expected CSRF token
///
/// # Returns
///
/// The return-to path and, when the state names a PKCE cookie, the verifier
/// stored in it. Fails if the state is malformed, the CSRF token does not
/// match, or the named PKCE cookie is absent or invalid.
pub fn verify_callback(
    encoded_state: &str,
    cookie_header: Option<&str>,
    csrf_cookie_name: &str,
) -> Result<CallbackBinding, Error> {
    let decoded = state::decode(encoded_state)?;
    let cookie_header = cookie_header.unwrap_or_default();

    let expected_csrf = get_cookie(cookie_header, csrf_cookie_name).ok_or_else(|| {
        warn!("OAuth callback without CSRF cookie {}", csrf_cookie_name);
        state_error(StateErrorKind::CsrfMismatch, "Missing CSRF cookie")
    })?;

    if !state::verify(&decoded.csrf, &expected_csrf) {
        warn!("OAuth callback CSRF token mismatch");
        return Err(state_error(
            StateErrorKind::CsrfMismatch,
            "CSRF token does not match",
        ));
    }

    let code_verifier = match &decoded.pkce_id {
        Some(pkce_id) => {
            let raw = get_cookie(cookie_header, &pkce_id.cookie_name()).ok_or_else(|| {
                warn!("OAuth callback without PKCE cookie for the state's pkceId");
                pkce_error(PkceErrorKind::MissingCookie, "Missing PKCE cookie")
            })?;
            let verifier = CodeVerifier::parse(&raw).map_err(|_| {
                pkce_error(
                    PkceErrorKind::MissingCookie,
                    "PKCE cookie does not hold a valid code verifier",
                )
            })?;
            Some(verifier)
        }
        None => None,
    };

    Ok(CallbackBinding {
        return_to: decoded.return_to,
        pkce_id: decoded.pkce_id,
        code_verifier,
    })
}
