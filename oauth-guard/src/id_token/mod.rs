//! ID token verification for external identity providers.
//!
//! A validation call resolves provider settings, reads the token header,
//! resolves the signing key through the shared [`KeyCache`], then verifies the
//! signature and claims. Any failing step ends the call.

mod keys;
mod provider;
mod validator;

pub use keys::{HttpKeySource, KeyCache, KeySource};
pub use provider::{ProviderKind, ProviderMetadata};
pub use validator::{Claims, ValidationOptions, Validator};
