//! ID token verification.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::Value;
use tracing::{debug, warn};

use super::keys::{HttpKeySource, KeyCache, KeySource};
use super::ProviderKind;
use crate::config::{ConfigSource, EnvConfig, ProviderSettings};
use crate::error::{id_token_error, Error, IdTokenErrorKind};
use crate::http::HttpClientConfig;

/// Verified token payload, every claim as sent.
pub type Claims = serde_json::Map<String, Value>;

const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Per-call checks on top of the provider's fixed ones.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Expected `nonce` claim, compared exactly.
    pub nonce: Option<String>,
    /// Maximum time since `iat`.
    pub max_age: Option<Duration>,
}

impl ValidationOptions {
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

/// Verifies ID tokens issued by the supported providers.
///
/// Cheap to clone. Provider settings are read from the config source on every
/// call; signing keys come from a [`KeyCache`], the process-wide one unless
/// [`Validator::with_key_cache`] says otherwise.
#[derive(Clone)]
pub struct Validator {
    config: Arc<dyn ConfigSource>,
    keys: Arc<KeyCache>,
    source: Arc<dyn KeySource>,
    leeway_secs: u64,
}

impl Validator {
    pub fn new(config: Arc<dyn ConfigSource>, source: Arc<dyn KeySource>) -> Self {
        Self {
            config,
            keys: KeyCache::shared(),
            source,
            leeway_secs: DEFAULT_LEEWAY_SECS,
        }
    }

    /// Validator reading the process environment and fetching keys over HTTP.
    pub fn from_env(http: HttpClientConfig) -> Result<Self, Error> {
        let source = HttpKeySource::from_config(http)?;
        Ok(Self::new(Arc::new(EnvConfig), Arc::new(source)))
    }

    /// Use `keys` instead of the process-wide cache.
    pub fn with_key_cache(mut self, keys: Arc<KeyCache>) -> Self {
        self.keys = keys;
        self
    }

    /// Verify `token` as an ID token from `provider`.
    ///
    /// Checks the signature against the provider's published key named by the
    /// header `kid`, then `iss`, `aud`, `exp` and `iat`, plus whatever `options`
    /// asks for. Returns the payload unmodified.
    ///
    /// # Errors
    ///
    /// * `Configuration` if the provider's client id (or tenant) is unset
    /// * `MalformedToken` if the header cannot be decoded or has no `kid`
    /// * `KeyRetrieval` if the signing key cannot be obtained; retryable
    /// * `Verification` for any signature or claim failure
    pub async fn validate(
        &self,
        token: &str,
        provider: ProviderKind,
        options: &ValidationOptions,
    ) -> Result<Claims, Error> {
        let settings = ProviderSettings::resolve(provider, self.config.as_ref())?;

        let header = decode_header(token).map_err(|e| {
            debug!("[{}] Undecodable token header: {}", provider, e);
            id_token_error(
                provider,
                IdTokenErrorKind::MalformedToken,
                "Invalid token header",
            )
        })?;

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| {
                id_token_error(
                    provider,
                    IdTokenErrorKind::MalformedToken,
                    "Missing kid in token header",
                )
            })?;

        let key = self
            .keys
            .get_or_fetch(provider, &kid, &settings.jwks_uri(), self.source.as_ref())
            .await?;

        let validation = self.validation_for(&settings);
        let claims = decode::<Claims>(token, &key, &validation)
            .map_err(|e| verification_error(provider, &describe_jwt_error(e.kind())))?
            .claims;

        self.check_issued_at(&claims, options.max_age)
            .and_then(|_| check_nonce(&claims, options.nonce.as_deref()))
            .map_err(|reason| verification_error(provider, &reason))?;

        debug!("[{}] ID token verified with key {}", provider, kid);
        Ok(claims)
    }

    fn validation_for(&self, settings: &ProviderSettings) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = settings.provider.metadata().algorithms.to_vec();
        validation.leeway = self.leeway_secs;
        validation.set_issuer(&settings.issuers());
        validation.set_audience(&[settings.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation
    }

    fn check_issued_at(&self, claims: &Claims, max_age: Option<Duration>) -> Result<(), String> {
        let iat = claims
            .get("iat")
            .and_then(|value| value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)))
            .ok_or_else(|| "missing iat claim".to_string())?;

        let now = chrono::Utc::now().timestamp();
        let leeway = i64::try_from(self.leeway_secs).unwrap_or(i64::MAX);

        if iat > now.saturating_add(leeway) {
            return Err("iat is in the future".to_string());
        }

        if let Some(max_age) = max_age {
            let allowed = i64::try_from(max_age.as_secs())
                .unwrap_or(i64::MAX)
                .saturating_add(leeway);
            // An age too large for i64 is older than any allowed maximum
            let exceeded = now.checked_sub(iat).map_or(true, |age| age > allowed);
            if exceeded {
                return Err("maxAge exceeded".to_string());
            }
        }

        Ok(())
    }
}

fn check_nonce(claims: &Claims, expected: Option<&str>) -> Result<(), String> {
    match expected {
        Some(expected) => {
            let actual = claims.get("nonce").and_then(Value::as_str);
            if actual == Some(expected) {
                Ok(())
            } else {
                Err("nonce mismatch".to_string())
            }
        }
        None => Ok(()),
    }
}

fn describe_jwt_error(kind: &JwtErrorKind) -> String {
    match kind {
        JwtErrorKind::ExpiredSignature => "jwt expired".to_string(),
        JwtErrorKind::ImmatureSignature => "jwt not active".to_string(),
        JwtErrorKind::InvalidSignature => "invalid signature".to_string(),
        JwtErrorKind::InvalidIssuer => "invalid issuer".to_string(),
        JwtErrorKind::InvalidAudience => "invalid audience".to_string(),
        JwtErrorKind::InvalidAlgorithm => "unexpected signing algorithm".to_string(),
        JwtErrorKind::MissingRequiredClaim(claim) => format!("missing {} claim", claim),
        other => format!("{:?}", other),
    }
}

fn verification_error(provider: ProviderKind, reason: &str) -> Error {
    warn!("[{}] ID token rejected: {}", provider, reason);
    id_token_error(
        provider,
        IdTokenErrorKind::Verification,
        &format!("Token verification failed: {}", reason),
    )
}
