//! Supported identity providers and their fixed metadata.

use std::fmt;
use std::str::FromStr;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

/// Identity providers whose ID tokens can be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Google,
    Microsoft,
    Apple,
}

/// Published, non-configurable facts about a provider.
///
/// `{tenant}` in a template is replaced with the configured tenant id.
#[derive(Debug)]
pub struct ProviderMetadata {
    /// Accepted `iss` values.
    pub issuers: &'static [&'static str],
    /// Key set endpoint.
    pub jwks_uri: &'static str,
    /// Signing algorithms the provider uses for ID tokens.
    pub algorithms: &'static [Algorithm],
    /// Configuration key holding the client id.
    pub client_id_key: &'static str,
    /// Configuration key holding the tenant id, for tenant-scoped issuers.
    pub tenant_id_key: Option<&'static str>,
}

const GOOGLE: ProviderMetadata = ProviderMetadata {
    // Google documents both forms for `iss`.
    issuers: &["https://accounts.google.com", "accounts.google.com"],
    jwks_uri: "https://www.googleapis.com/oauth2/v3/certs",
    algorithms: &[Algorithm::RS256],
    client_id_key: "GOOGLE_CLIENT_ID",
    tenant_id_key: None,
};

const MICROSOFT: ProviderMetadata = ProviderMetadata {
    issuers: &["https://login.microsoftonline.com/{tenant}/v2.0"],
    jwks_uri: "https://login.microsoftonline.com/{tenant}/discovery/v2.0/keys",
    algorithms: &[Algorithm::RS256],
    client_id_key: "MICROSOFT_CLIENT_ID",
    tenant_id_key: Some("MICROSOFT_TENANT_ID"),
};

const APPLE: ProviderMetadata = ProviderMetadata {
    issuers: &["https://appleid.apple.com"],
    jwks_uri: "https://appleid.apple.com/auth/keys",
    algorithms: &[Algorithm::RS256],
    client_id_key: "APPLE_CLIENT_ID",
    tenant_id_key: None,
};

impl ProviderKind {
    /// Every supported provider.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Google,
        ProviderKind::Microsoft,
        ProviderKind::Apple,
    ];

    /// Get the provider identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Microsoft => "microsoft",
            ProviderKind::Apple => "apple",
        }
    }

    pub fn metadata(&self) -> &'static ProviderMetadata {
        match self {
            ProviderKind::Google => &GOOGLE,
            ProviderKind::Microsoft => &MICROSOFT,
            ProviderKind::Apple => &APPLE,
        }
    }

    pub fn client_id_key(&self) -> &'static str {
        self.metadata().client_id_key
    }

    pub fn tenant_id_key(&self) -> Option<&'static str> {
        self.metadata().tenant_id_key
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "google" => Ok(ProviderKind::Google),
            "microsoft" => Ok(ProviderKind::Microsoft),
            "apple" => Ok(ProviderKind::Apple),
            other => Err(format!("unsupported identity provider: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_as_str_round_trips() {
        for provider in ProviderKind::ALL {
            assert_eq!(provider.as_str().parse::<ProviderKind>(), Ok(provider));
        }
        assert_eq!("Google".parse::<ProviderKind>(), Ok(ProviderKind::Google));
        assert!("github".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_only_microsoft_is_tenant_scoped() {
        assert_eq!(ProviderKind::Google.tenant_id_key(), None);
        assert_eq!(ProviderKind::Apple.tenant_id_key(), None);
        assert_eq!(
            ProviderKind::Microsoft.tenant_id_key(),
            Some("MICROSOFT_TENANT_ID")
        );
    }

    #[test]
    fn test_serde_uses_identifier_strings() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::Microsoft).unwrap(),
            "\"microsoft\""
        );
        let parsed: ProviderKind = serde_json::from_str("\"apple\"").unwrap();
        assert_eq!(parsed, ProviderKind::Apple);
    }
}
