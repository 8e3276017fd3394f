use clap::builder::TypedValueParser as _;
use clap::Args;
use dotenvy::dotenv;
use log::LevelFilter;
use oauth_guard::http::HttpClientConfig;
use std::time::Duration;

/// Settings shared by every operator command.
///
/// Provider client ids and tenants are not read here. The validator looks
/// them up in the environment on each call.
#[derive(Clone, Debug, Args)]
pub struct Config {
    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        global = true,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap_or(LevelFilter::Info)),
        )]
    pub log_level_filter: LevelFilter,

    /// Timeout in seconds for fetching a provider's published signing keys
    #[arg(long, env, global = true, default_value_t = 10)]
    pub key_fetch_timeout_secs: u64,

    /// Retries on transient key fetch failures. Zero reports the first failure
    #[arg(long, env, global = true, default_value_t = 0)]
    pub key_fetch_max_retries: u32,

    /// User agent sent when fetching signing keys
    #[arg(long, env, global = true)]
    key_fetch_user_agent: Option<String>,
}

impl Config {
    /// Load a `.env` file, if present, into the process environment.
    ///
    /// Call before parsing so `env` fallbacks and provider settings see it.
    pub fn load_dotenv() {
        dotenv().ok();
    }

    pub fn key_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.key_fetch_timeout_secs)
    }

    pub fn key_fetch_user_agent(&self) -> Option<String> {
        self.key_fetch_user_agent.clone()
    }

    /// HTTP client settings for the signing key fetcher.
    pub fn http_client_config(&self) -> HttpClientConfig {
        let defaults = HttpClientConfig::default();
        HttpClientConfig {
            timeout: self.key_fetch_timeout(),
            max_retries: self.key_fetch_max_retries,
            user_agent: self.key_fetch_user_agent().unwrap_or(defaults.user_agent),
        }
    }
}
