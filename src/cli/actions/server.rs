use crate::{
    api,
    auth::{endpoints::Ceilings, state::AuthConfig},
    cli::telemetry,
};
use anyhow::Result;
use axum::Router;
use jsonwebtoken::Algorithm;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub google_client_id: String,
    pub token_secret: SecretString,
    pub token_algorithm: Algorithm,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub session_cache_ttl_seconds: u64,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_ceiling: usize,
    pub sweep_interval_seconds: u64,
    pub anon_ceiling_overrides: Vec<String>,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the ceiling overrides are invalid or the server
/// fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let ceilings = Ceilings::defaults()
        .with_overrides(args.anon_ceiling_overrides.iter().map(String::as_str))?;

    let config = AuthConfig::new(args.google_client_id, args.token_secret)
        .with_token_algorithm(args.token_algorithm)
        .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
        .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds)
        .with_session_cache_ttl_seconds(args.session_cache_ttl_seconds)
        .with_rate_limit_window_seconds(args.rate_limit_window_seconds)
        .with_rate_limit_ceiling(args.rate_limit_ceiling)
        .with_sweep_interval_seconds(args.sweep_interval_seconds)
        .with_ceilings(ceilings);

    // Content routes are mounted by the embedding deployment; the gate
    // still meters any metered path routed through it.
    let result = api::new(args.port, args.dsn, config, Router::new()).await;

    telemetry::shutdown_tracer();

    result
}
