//! Auth configuration and shared state.

use anyhow::Result;
use jsonwebtoken::Algorithm;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use super::access_token::AccessTokenCodec;
use super::endpoints::Ceilings;
use super::gateway::Gateway;
use super::ledger::UsageLedger;
use super::rate_limit::RateLimiter;
use super::session::SessionRegistry;
use super::verifier::CredentialVerifier;
use crate::storage::{SessionStore, UsageStore};

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: u64 = 60 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_SESSION_CACHE_TTL_SECONDS: u64 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
const DEFAULT_RATE_LIMIT_CEILING: usize = 30;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    google_client_id: String,
    token_secret: SecretString,
    token_algorithm: Algorithm,
    access_token_ttl_seconds: u64,
    refresh_token_ttl_seconds: u64,
    session_cache_ttl_seconds: u64,
    rate_limit_window_seconds: u64,
    rate_limit_ceiling: usize,
    sweep_interval_seconds: u64,
    ceilings: Ceilings,
}

impl AuthConfig {
    #[must_use]
    pub fn new(google_client_id: String, token_secret: SecretString) -> Self {
        Self {
            google_client_id,
            token_secret,
            token_algorithm: Algorithm::HS256,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            session_cache_ttl_seconds: DEFAULT_SESSION_CACHE_TTL_SECONDS,
            rate_limit_window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            rate_limit_ceiling: DEFAULT_RATE_LIMIT_CEILING,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            ceilings: Ceilings::defaults(),
        }
    }

    #[must_use]
    pub fn with_token_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.token_algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_cache_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit_window_seconds(mut self, seconds: u64) -> Self {
        self.rate_limit_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit_ceiling(mut self, ceiling: usize) -> Self {
        self.rate_limit_ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_ceilings(mut self, ceilings: Ceilings) -> Self {
        self.ceilings = ceilings;
        self
    }

    #[must_use]
    pub fn google_client_id(&self) -> &str {
        &self.google_client_id
    }

    #[must_use]
    pub fn token_algorithm(&self) -> Algorithm {
        self.token_algorithm
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_seconds)
    }

    #[must_use]
    pub fn session_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.session_cache_ttl_seconds)
    }

    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }

    #[must_use]
    pub fn rate_limit_ceiling(&self) -> usize {
        self.rate_limit_ceiling
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    #[must_use]
    pub fn ceilings(&self) -> &Ceilings {
        &self.ceilings
    }

    pub(crate) fn token_secret(&self) -> &SecretString {
        &self.token_secret
    }
}

/// Everything the request path needs, constructed once at startup and shared
/// behind an `Arc` through the router.
pub struct AuthState {
    config: AuthConfig,
    verifier: CredentialVerifier,
    codec: Arc<AccessTokenCodec>,
    sessions: Arc<SessionRegistry>,
    ledger: Arc<UsageLedger>,
    gateway: Gateway,
}

impl AuthState {
    /// Wire the auth components over the given stores and limiter.
    ///
    /// # Errors
    /// Returns an error for an unusable token algorithm or an incomplete
    /// ceiling table.
    pub fn new(
        config: AuthConfig,
        session_store: Arc<dyn SessionStore>,
        usage_store: Arc<dyn UsageStore>,
        http: reqwest::Client,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self> {
        config.ceilings().validate()?;

        let codec = Arc::new(AccessTokenCodec::new(
            config.token_secret(),
            config.token_algorithm(),
            config.access_token_ttl(),
        )?);
        let sessions = Arc::new(SessionRegistry::new(
            session_store,
            config.session_cache_ttl(),
            config.access_token_ttl(),
            config.refresh_token_ttl(),
        ));
        let ledger = Arc::new(UsageLedger::new(usage_store));
        let verifier = CredentialVerifier::google(http, config.google_client_id().to_string());
        let gateway = Gateway::new(
            codec.clone(),
            sessions.clone(),
            ledger.clone(),
            limiter,
            config.ceilings().clone(),
        );

        Ok(Self {
            config,
            verifier,
            codec,
            sessions,
            ledger,
            gateway,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn codec(&self) -> &AccessTokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    #[must_use]
    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}
