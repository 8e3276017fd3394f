//! Error types for the `oauth-guard` crate.
//!
//! A root `Error` struct holds the error kind tree, the optional source for
//! chaining, and the identity provider the failure belongs to (if any).

use std::error::Error as StdError;
use std::fmt;

use crate::id_token::ProviderKind;

/// Top-level error type for oauth-guard.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
    /// Provider the failing operation was running against.
    pub provider: Option<ProviderKind>,
}

/// Major categories of errors in oauth-guard.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Pkce(PkceErrorKind),
    State(StateErrorKind),
    IdToken(IdTokenErrorKind),
    Http(HttpErrorKind),
}

/// Errors from PKCE operations.
#[derive(Debug, PartialEq)]
pub enum PkceErrorKind {
    /// A verifier failed the RFC 7636 format check.
    InvalidVerifier,
    /// A cookie id failed the 32-hex-character check.
    InvalidCookieId,
    /// The PKCE cookie named by the state is absent or holds an invalid verifier.
    MissingCookie,
}

/// Errors from decoding or checking the OAuth `state` parameter.
#[derive(Debug, PartialEq)]
pub enum StateErrorKind {
    Malformed,
    CsrfMismatch,
}

/// Errors from ID token validation.
#[derive(Debug, PartialEq)]
pub enum IdTokenErrorKind {
    /// Required provider configuration is absent. A deployment defect.
    Configuration,
    /// Header undecodable or missing a key id.
    MalformedToken,
    /// The signing key could not be fetched or located. Retryable.
    KeyRetrieval,
    /// Signature or claims check failed.
    Verification,
}

/// Errors from HTTP client operations.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    RequestFailed,
    Timeout,
    Network,
}

impl Error {
    /// Whether the caller may retry the whole operation, with backoff.
    ///
    /// Only key retrieval failures qualify; everything else fails the same
    /// way on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::IdToken(IdTokenErrorKind::KeyRetrieval)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        match &self.source {
            Some(source) => write!(f, "{}", source),
            None => match &self.error_kind {
                ErrorKind::Pkce(kind) => write!(f, "PKCE error: {:?}", kind),
                ErrorKind::State(kind) => write!(f, "State error: {:?}", kind),
                ErrorKind::IdToken(kind) => write!(f, "ID token error: {:?}", kind),
                ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind),
            },
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_timeout() {
            ErrorKind::Http(HttpErrorKind::Timeout)
        } else if err.is_request() || err.is_status() || err.is_decode() {
            ErrorKind::Http(HttpErrorKind::RequestFailed)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
            provider: None,
        }
    }
}

impl From<reqwest_middleware::Error> for Error {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(err) => err.into(),
            other => Error {
                source: Some(Box::new(other)),
                error_kind: ErrorKind::Http(HttpErrorKind::Network),
                provider: None,
            },
        }
    }
}

/// Helper function to create PKCE errors.
pub fn pkce_error(kind: PkceErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Pkce(kind),
        provider: None,
    }
}

/// Helper function to create state errors.
pub fn state_error(kind: StateErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::State(kind),
        provider: None,
    }
}

/// Helper function to create ID token errors tagged with their provider.
pub fn id_token_error(provider: ProviderKind, kind: IdTokenErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::IdToken(kind),
        provider: Some(provider),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes_provider_tag() {
        let err = id_token_error(
            ProviderKind::Microsoft,
            IdTokenErrorKind::MalformedToken,
            "Invalid token header",
        );
        assert_eq!(err.to_string(), "[microsoft] Invalid token header");
    }

    #[test]
    fn test_display_without_provider() {
        let err = state_error(StateErrorKind::Malformed, "Malformed state");
        assert_eq!(err.to_string(), "Malformed state");
    }

    #[test]
    fn test_only_key_retrieval_is_retryable() {
        let retrieval = id_token_error(
            ProviderKind::Google,
            IdTokenErrorKind::KeyRetrieval,
            "Failed to retrieve signing key for kid abc",
        );
        let verification = id_token_error(
            ProviderKind::Google,
            IdTokenErrorKind::Verification,
            "Token verification failed: jwt expired",
        );
        let config = id_token_error(
            ProviderKind::Apple,
            IdTokenErrorKind::Configuration,
            "Missing APPLE_CLIENT_ID environment variable",
        );

        assert!(retrieval.is_retryable());
        assert!(!verification.is_retryable());
        assert!(!config.is_retryable());
        assert!(!pkce_error(PkceErrorKind::InvalidVerifier, "bad").is_retryable());
    }
}
