//! HTTP client builder for key set fetches.

use std::time::Duration;

use reqwest_middleware::ClientBuilder;
use reqwest_retry::RetryTransientMiddleware;

use super::KeyFetchBackoff;
use crate::error::Error;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout. A fetch that runs past it fails instead of hanging.
    pub timeout: Duration,
    /// Retries on transient failures. Zero reports the first failure as is.
    pub max_retries: u32,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            user_agent: format!("oauth-guard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client with middleware.
pub type HttpClient = reqwest_middleware::ClientWithMiddleware;

/// Builder for the key set HTTP client.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    /// Create a new client builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: HttpClientConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    /// Build the configured HTTP client.
    pub fn build(self) -> Result<HttpClient, Error> {
        let client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(self.config.user_agent)
            .build()?;

        let builder = ClientBuilder::new(client);
        let client = if self.config.max_retries > 0 {
            let policy = KeyFetchBackoff::new(self.config.max_retries);
            builder
                .with(RetryTransientMiddleware::new_with_policy(policy))
                .build()
        } else {
            builder.build()
        };

        Ok(client)
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let builder = HttpClientBuilder::new();
        assert_eq!(builder.config.timeout, Duration::from_secs(10));
        assert_eq!(builder.config.max_retries, 0);
        assert!(builder.config.user_agent.starts_with("oauth-guard/"));
    }

    #[test]
    fn test_builder_from_config() {
        let builder = HttpClientBuilder::from_config(HttpClientConfig {
            timeout: Duration::from_secs(3),
            max_retries: 2,
            user_agent: "test-agent".to_string(),
        });
        assert_eq!(builder.config.timeout, Duration::from_secs(3));
        assert_eq!(builder.config.max_retries, 2);
        assert_eq!(builder.config.user_agent, "test-agent");
    }

    #[tokio::test]
    async fn test_build_client() {
        assert!(HttpClientBuilder::new().build().is_ok());
        let retrying = HttpClientConfig {
            max_retries: 2,
            ..HttpClientConfig::default()
        };
        assert!(HttpClientBuilder::from_config(retrying).build().is_ok());
    }
}
