//! OAuth 2.0 authorization-flow helpers.
//!
//! Everything here is pure and synchronous: PKCE artifacts for the start
//! handler, the `state` codec, and the callback-side binding check.

pub mod binding;
pub mod pkce;
pub mod state;

pub use binding::{verify_callback, CallbackBinding, CSRF_COOKIE_NAME};
pub use pkce::{CodeChallenge, CodeVerifier, PkceCookieId};
pub use state::OAuthState;
