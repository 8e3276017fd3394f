//! Per-provider settings read from an environment-style key/value source.
//!
//! Settings are looked up on every validation rather than cached, so a
//! rotated client id takes effect without a restart.

use std::collections::HashMap;

use crate::error::{id_token_error, Error, IdTokenErrorKind};
use crate::id_token::ProviderKind;

/// Source of configuration values keyed by environment variable name.
pub trait ConfigSource: Send + Sync {
    /// Get a value, or `None` if the key is unset.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl ConfigSource for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed in-memory values, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MapConfig(HashMap<String, String>);

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a value.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigSource for MapConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Resolved settings for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider: ProviderKind,
    /// Registered client id, the expected `aud` claim.
    pub client_id: String,
    /// Directory tenant, set only for tenant-scoped providers.
    pub tenant_id: Option<String>,
}

impl ProviderSettings {
    /// Resolve settings for `provider`, failing if a required key is unset or blank.
    pub fn resolve(provider: ProviderKind, source: &dyn ConfigSource) -> Result<Self, Error> {
        let client_id = require(provider, source, provider.client_id_key())?;
        let tenant_id = match provider.tenant_id_key() {
            Some(key) => Some(require(provider, source, key)?),
            None => None,
        };

        Ok(Self {
            provider,
            client_id,
            tenant_id,
        })
    }

    /// Issuer values accepted for this provider, tenant-qualified where needed.
    pub fn issuers(&self) -> Vec<String> {
        self.provider
            .metadata()
            .issuers
            .iter()
            .map(|template| self.fill_tenant(template))
            .collect()
    }

    /// URL of the provider's published key set.
    pub fn jwks_uri(&self) -> String {
        self.fill_tenant(self.provider.metadata().jwks_uri)
    }

    fn fill_tenant(&self, template: &str) -> String {
        match &self.tenant_id {
            Some(tenant_id) => template.replace("{tenant}", tenant_id),
            None => template.to_string(),
        }
    }
}

fn require(provider: ProviderKind, source: &dyn ConfigSource, key: &str) -> Result<String, Error> {
    source
        .get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            id_token_error(
                provider,
                IdTokenErrorKind::Configuration,
                &format!("Missing {} environment variable", key),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_resolve_google() {
        let source = MapConfig::new().with("GOOGLE_CLIENT_ID", "google-client");
        let settings = ProviderSettings::resolve(ProviderKind::Google, &source).unwrap();

        assert_eq!(settings.client_id, "google-client");
        assert_eq!(settings.tenant_id, None);
        assert_eq!(
            settings.issuers(),
            vec!["https://accounts.google.com", "accounts.google.com"]
        );
        assert_eq!(
            settings.jwks_uri(),
            "https://www.googleapis.com/oauth2/v3/certs"
        );
    }

    #[test]
    fn test_resolve_microsoft_is_tenant_qualified() {
        let source = MapConfig::new()
            .with("MICROSOFT_CLIENT_ID", "ms-client")
            .with("MICROSOFT_TENANT_ID", "contoso");
        let settings = ProviderSettings::resolve(ProviderKind::Microsoft, &source).unwrap();

        assert_eq!(settings.tenant_id.as_deref(), Some("contoso"));
        assert_eq!(
            settings.issuers(),
            vec!["https://login.microsoftonline.com/contoso/v2.0"]
        );
        assert_eq!(
            settings.jwks_uri(),
            "https://login.microsoftonline.com/contoso/discovery/v2.0/keys"
        );
    }

    #[test]
    fn test_missing_client_id_names_provider_and_key() {
        for provider in ProviderKind::ALL {
            let err = ProviderSettings::resolve(provider, &MapConfig::new()).unwrap_err();
            assert_eq!(
                err.error_kind,
                ErrorKind::IdToken(IdTokenErrorKind::Configuration)
            );
            assert_eq!(err.provider, Some(provider));
            let message = err.to_string();
            assert!(message.contains(&format!("[{}]", provider)), "{}", message);
            assert!(message.contains(provider.client_id_key()), "{}", message);
        }
    }

    #[test]
    fn test_missing_tenant_only_matters_for_microsoft() {
        let source = MapConfig::new()
            .with("MICROSOFT_CLIENT_ID", "ms-client")
            .with("APPLE_CLIENT_ID", "apple-client");

        let err = ProviderSettings::resolve(ProviderKind::Microsoft, &source).unwrap_err();
        assert!(err.to_string().contains("MICROSOFT_TENANT_ID"));

        assert!(ProviderSettings::resolve(ProviderKind::Apple, &source).is_ok());
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let source = MapConfig::new().with("APPLE_CLIENT_ID", "   ");
        assert!(ProviderSettings::resolve(ProviderKind::Apple, &source).is_err());
    }
}
