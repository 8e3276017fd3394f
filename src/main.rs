use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};
use oauth_guard::id_token::{ProviderKind, ValidationOptions, Validator};
use oauth_guard::oauth::{pkce, state, verify_callback, OAuthState, PkceCookieId, CSRF_COOKIE_NAME};
use serde_json::{json, Value};
use service::{config::Config, logging};

/// Operator tool for the OAuth flow security core.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a PKCE verifier, its S256 challenge and a binding cookie id
    Pkce,

    /// Build an opaque state value for an authorization request
    StateEncode {
        /// Path to land on after sign-in
        #[arg(long, default_value = "/")]
        return_to: String,

        /// CSRF token to embed; a fresh one is generated when omitted
        #[arg(long)]
        csrf: Option<String>,

        /// PKCE cookie id to bind (32 lowercase hex characters)
        #[arg(long)]
        pkce_id: Option<String>,
    },

    /// Decode an opaque state value
    StateDecode {
        state: String,
    },

    /// Extract only the sanitized return-to path, defaulting to "/"
    ReturnToDecode {
        state: Option<String>,
    },

    /// Compare a received CSRF token with the expected one
    VerifyCsrf {
        received: String,
        expected: String,
    },

    /// Check a callback's state against its Cookie header
    VerifyCallback {
        #[arg(long)]
        state: String,

        /// Raw Cookie header value
        #[arg(long)]
        cookie: Option<String>,

        #[arg(long, default_value = CSRF_COOKIE_NAME)]
        csrf_cookie_name: String,
    },

    /// Verify an ID token and print its claims
    VerifyIdToken {
        #[arg(long, value_parser = parse_provider)]
        provider: ProviderKind,

        #[arg(long, env = "ID_TOKEN", hide_env_values = true)]
        token: String,

        #[arg(long)]
        nonce: Option<String>,

        /// Reject tokens issued longer ago than this
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
}

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    value.parse()
}

#[tokio::main]
async fn main() {
    Config::load_dotenv();
    let cli = Cli::parse();

    if let Err(e) = logging::init_logger(&cli.config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

/// Execute one command, printing its result as JSON on stdout.
///
/// Returns `Ok(false)` when a check ran but did not pass.
async fn run(cli: Cli) -> Result<bool, oauth_guard::Error> {
    match cli.command {
        Command::Pkce => {
            let verifier = pkce::generate_code_verifier();
            let cookie_id = pkce::generate_cookie_id();
            print_json(json!({
                "codeVerifier": verifier.as_str(),
                "codeChallenge": verifier.challenge().as_str(),
                "codeChallengeMethod": oauth_guard::oauth::CodeChallenge::METHOD,
                "pkceId": cookie_id.as_str(),
                "cookieName": cookie_id.cookie_name(),
            }));
        }
        Command::StateEncode {
            return_to,
            csrf,
            pkce_id,
        } => {
            let csrf = csrf.unwrap_or_else(state::generate_csrf_token);
            let pkce_id = pkce_id.as_deref().map(PkceCookieId::parse).transpose()?;
            let encoded = state::encode(&OAuthState::new(csrf.clone(), return_to, pkce_id));
            print_json(json!({ "state": encoded, "csrf": csrf }));
        }
        Command::StateDecode { state: opaque } => {
            let decoded = state::decode(&opaque)?;
            print_json(state_json(&decoded));
        }
        Command::ReturnToDecode { state: opaque } => {
            print_json(json!({ "returnTo": state::decode_return_to_only(opaque.as_deref()) }));
        }
        Command::VerifyCsrf { received, expected } => {
            let matched = state::verify(&received, &expected);
            print_json(json!({ "match": matched }));
            return Ok(matched);
        }
        Command::VerifyCallback {
            state: opaque,
            cookie,
            csrf_cookie_name,
        } => {
            let binding = verify_callback(&opaque, cookie.as_deref(), &csrf_cookie_name)?;
            print_json(json!({
                "returnTo": binding.return_to,
                "pkceId": binding.pkce_id.as_ref().map(PkceCookieId::as_str),
                "codeVerifierPresent": binding.code_verifier.is_some(),
            }));
        }
        Command::VerifyIdToken {
            provider,
            token,
            nonce,
            max_age_secs,
        } => {
            let validator = Validator::from_env(cli.config.http_client_config())?;
            let options = ValidationOptions {
                nonce,
                max_age: max_age_secs.map(Duration::from_secs),
            };

            info!("Verifying {} ID token", provider);
            let claims = validator.validate(&token, provider, &options).await?;
            print_json(Value::Object(claims));
        }
    }

    Ok(true)
}

fn state_json(decoded: &OAuthState) -> Value {
    json!({
        "csrf": decoded.csrf,
        "returnTo": decoded.return_to,
        "pkceId": decoded.pkce_id.as_ref().map(PkceCookieId::as_str),
    })
}

fn print_json(value: Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => error!("Failed to render output: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_verify_id_token() {
        let cli = Cli::try_parse_from([
            "oauth_guard_rs",
            "verify-id-token",
            "--provider",
            "Microsoft",
            "--token",
            "a.b.c",
            "--max-age-secs",
            "300",
        ])
        .unwrap();

        match cli.command {
            Command::VerifyIdToken {
                provider,
                max_age_secs,
                nonce,
                ..
            } => {
                assert_eq!(provider, ProviderKind::Microsoft);
                assert_eq!(max_age_secs, Some(300));
                assert_eq!(nonce, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let result = Cli::try_parse_from([
            "oauth_guard_rs",
            "verify-id-token",
            "--provider",
            "github",
            "--token",
            "a.b.c",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_state_json_uses_wire_field_names() {
        let pkce_id = pkce::generate_cookie_id();
        let value = state_json(&OAuthState::new("abc", "/inbox", Some(pkce_id.clone())));

        assert_eq!(value["csrf"], "abc");
        assert_eq!(value["returnTo"], "/inbox");
        assert_eq!(value["pkceId"], pkce_id.as_str());
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_pkce_id() {
        let cli = Cli::try_parse_from([
            "oauth_guard_rs",
            "state-encode",
            "--pkce-id",
            "not-hex",
        ])
        .unwrap();

        assert!(run(cli).await.is_err());
    }

    #[tokio::test]
    async fn test_run_reports_csrf_mismatch_as_failed_check() {
        let cli =
            Cli::try_parse_from(["oauth_guard_rs", "verify-csrf", "abc", "abd"]).unwrap();
        assert!(!run(cli).await.unwrap());

        let cli =
            Cli::try_parse_from(["oauth_guard_rs", "verify-csrf", "abc", "abc"]).unwrap();
        assert!(run(cli).await.unwrap());
    }
}
