//! # oauth-guard
//!
//! Security core for OAuth 2.0 / OpenID Connect request handlers:
//! - PKCE verifiers, challenges and binding cookie ids
//! - The opaque `state` parameter (CSRF token, return-to path, PKCE binding)
//! - ID token verification against Google, Microsoft and Apple key sets
//!
//! ## Architecture
//!
//! The crate stays out of transport: it consumes raw header values, cookie
//! values and tokens, and returns validated data or a typed [`Error`].
//! - `oauth` is pure and synchronous (start and callback handler helpers)
//! - `id_token` is async and owns the process-wide signing key cache
//! - `config` reads per-provider settings from an environment-style source
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oauth_guard::{
//!     oauth::{pkce, state, OAuthState},
//!     id_token::{ProviderKind, ValidationOptions, Validator},
//! };
//!
//! // start handler
//! let verifier = pkce::generate_code_verifier();
//! let challenge = verifier.challenge();
//! let pkce_id = pkce::generate_cookie_id();
//! let csrf = state::generate_csrf_token();
//! let opaque = state::encode(&OAuthState::new(csrf, "/dashboard", Some(pkce_id)));
//!
//! // callback handler
//! let validator = Validator::from_env(Default::default())?;
//! let claims = validator
//!     .validate(&id_token, ProviderKind::Google, &ValidationOptions::default())
//!     .await?;
//! ```

pub mod config;
pub mod cookies;
pub mod error;
pub mod http;
pub mod id_token;
pub mod oauth;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
