use clap::{Arg, ArgMatches, Command};
use jsonwebtoken::Algorithm;
use secrecy::SecretString;

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_ALGORITHM: &str = "token-algorithm";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_SESSION_CACHE_TTL: &str = "session-cache-ttl-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub google_client_id: String,
    pub token_secret: SecretString,
    pub token_algorithm: Algorithm,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub session_cache_ttl_seconds: u64,
}

impl Options {
    /// Parse authentication arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing or the signing
    /// algorithm is not an HMAC variant.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let google_client_id = matches
            .get_one::<String>(ARG_GOOGLE_CLIENT_ID)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_GOOGLE_CLIENT_ID}"))?;

        let token_secret = matches
            .get_one::<String>(ARG_TOKEN_SECRET)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_TOKEN_SECRET}"))?;

        let token_algorithm = match matches
            .get_one::<String>(ARG_TOKEN_ALGORITHM)
            .map(String::as_str)
        {
            Some("HS384") => Algorithm::HS384,
            Some("HS512") => Algorithm::HS512,
            _ => Algorithm::HS256,
        };

        let get_seconds = |id: &str, default: u64| {
            matches.get_one::<u64>(id).copied().unwrap_or(default)
        };

        Ok(Self {
            google_client_id,
            token_secret,
            token_algorithm,
            access_token_ttl_seconds: get_seconds(ARG_ACCESS_TOKEN_TTL, 3600),
            refresh_token_ttl_seconds: get_seconds(ARG_REFRESH_TOKEN_TTL, 2_592_000),
            session_cache_ttl_seconds: get_seconds(ARG_SESSION_CACHE_TTL, 5),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client ID expected in ID token audiences")
                .env("WORDGATE_GOOGLE_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HMAC secret used to sign and verify access tokens")
                .env("WORDGATE_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_ALGORITHM)
                .long(ARG_TOKEN_ALGORITHM)
                .help("Access token signing algorithm")
                .env("WORDGATE_TOKEN_ALGORITHM")
                .default_value("HS256")
                .value_parser(["HS256", "HS384", "HS512"]),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token TTL in seconds")
                .env("WORDGATE_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long(ARG_REFRESH_TOKEN_TTL)
                .help("Refresh token TTL in seconds")
                .env("WORDGATE_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SESSION_CACHE_TTL)
                .long(ARG_SESSION_CACHE_TTL)
                .help("Session read-through cache TTL in seconds")
                .env("WORDGATE_SESSION_CACHE_TTL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
}
