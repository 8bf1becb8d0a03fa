//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, limits};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let limit_opts = limits::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        google_client_id: auth_opts.google_client_id,
        token_secret: auth_opts.token_secret,
        token_algorithm: auth_opts.token_algorithm,
        access_token_ttl_seconds: auth_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: auth_opts.refresh_token_ttl_seconds,
        session_cache_ttl_seconds: auth_opts.session_cache_ttl_seconds,
        rate_limit_window_seconds: limit_opts.rate_limit_window_seconds,
        rate_limit_ceiling: limit_opts.rate_limit_ceiling,
        sweep_interval_seconds: limit_opts.sweep_interval_seconds,
        anon_ceiling_overrides: limit_opts.anon_ceiling_overrides,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::Algorithm;

    #[test]
    fn google_client_id_required() {
        temp_env::with_vars(
            [
                ("WORDGATE_GOOGLE_CLIENT_ID", None::<&str>),
                ("WORDGATE_TOKEN_SECRET", Some("a-very-long-signing-secret")),
                (
                    "WORDGATE_DSN",
                    Some("postgres://user@localhost:5432/wordgate"),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command
                    .try_get_matches_from(vec![
                        "wordgate",
                        "--google-client-id",
                        "",
                        "--token-secret",
                        "a-very-long-signing-secret",
                        "--dsn",
                        "postgres://user@localhost:5432/wordgate",
                    ])
                    .expect("parse");
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("missing required argument: --google-client-id")
                    );
                }
            },
        );
    }

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(
            [
                (
                    "WORDGATE_DSN",
                    Some("postgres://user@localhost:5432/wordgate"),
                ),
                (
                    "WORDGATE_GOOGLE_CLIENT_ID",
                    Some("client-id.apps.googleusercontent.com"),
                ),
                ("WORDGATE_TOKEN_SECRET", Some("a-very-long-signing-secret")),
                ("WORDGATE_TOKEN_ALGORITHM", Some("HS384")),
                ("WORDGATE_PORT", Some("9090")),
                ("WORDGATE_RATE_LIMIT_CEILING", Some("7")),
                (
                    "WORDGATE_ANON_CEILING",
                    Some("/api/words-explanation=5"),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["wordgate"]);
                let action = handler(&matches).expect("handler");
                let Action::Server(args) = action;
                assert_eq!(args.port, 9090);
                assert_eq!(args.dsn, "postgres://user@localhost:5432/wordgate");
                assert_eq!(
                    args.google_client_id,
                    "client-id.apps.googleusercontent.com"
                );
                assert_eq!(args.token_algorithm, Algorithm::HS384);
                assert_eq!(args.rate_limit_ceiling, 7);
                assert_eq!(
                    args.anon_ceiling_overrides,
                    vec!["/api/words-explanation=5".to_string()]
                );
            },
        );
    }
}
