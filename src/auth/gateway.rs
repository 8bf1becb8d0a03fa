//! Authentication gateway: the single admission decision for every metered
//! request.
//!
//! Exactly one of three branches applies, keyed on which credentials the
//! request carries:
//!
//! 1. bearer access token: parse it (ignoring its embedded expiry), resolve
//!    the referenced session, and admit only a VALID, unexpired one;
//! 2. anonymous id without a token: the id must already be known, then its
//!    per-endpoint counter is checked against the ceiling before counting;
//! 3. neither: mint a new anonymous id seeded with this first call.
//!
//! Branch 2 checks existence before the ceiling. Reversing that order would
//! let a caller present made-up ids and be treated as brand new each time,
//! sidestepping the quota.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

use super::access_token::{AccessClaims, AccessTokenCodec};
use super::endpoints::{Ceilings, Endpoint};
use super::error::AuthError;
use super::ledger::UsageLedger;
use super::rate_limit::{RateLimitDecision, RateLimiter};
use super::session::SessionRegistry;

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

/// Normalized credentials of an inbound request; the transport layer fills
/// this in from headers and the request path.
#[derive(Debug, Clone)]
pub struct RequestCredentials<'a> {
    pub caller: &'a str,
    pub bearer_token: Option<&'a str>,
    pub anonymous_id: Option<&'a str>,
    pub endpoint: Endpoint,
}

/// Outcome of an admitted request.
#[derive(Debug, Clone)]
pub enum AuthContext {
    Authenticated {
        session_id: Uuid,
        identity_id: Uuid,
        claims: AccessClaims,
    },
    Anonymous {
        anonymous_id: String,
        /// Set when the id was minted by this request; the transport layer
        /// must return it to the caller for use on subsequent requests.
        newly_created: bool,
    },
}

pub struct Gateway {
    codec: Arc<AccessTokenCodec>,
    sessions: Arc<SessionRegistry>,
    ledger: Arc<UsageLedger>,
    limiter: Arc<dyn RateLimiter>,
    ceilings: Ceilings,
}

impl Gateway {
    #[must_use]
    pub fn new(
        codec: Arc<AccessTokenCodec>,
        sessions: Arc<SessionRegistry>,
        ledger: Arc<UsageLedger>,
        limiter: Arc<dyn RateLimiter>,
        ceilings: Ceilings,
    ) -> Self {
        Self {
            codec,
            sessions,
            ledger,
            limiter,
            ceilings,
        }
    }

    /// Admit or reject one request. No partial admission: any failure maps
    /// to exactly one error kind and the request never reaches the content
    /// handler.
    ///
    /// # Errors
    /// One of the admission error kinds; see the branch contracts above.
    pub async fn authorize(
        &self,
        request: &RequestCredentials<'_>,
    ) -> Result<AuthContext, AuthError> {
        if self.limiter.check(request.caller, request.endpoint) == RateLimitDecision::Limited {
            debug!(caller = request.caller, endpoint = %request.endpoint, "rate limited");
            return Err(AuthError::LimitExceeded);
        }

        if let Some(token) = request.bearer_token {
            return self.authorize_bearer(token).await;
        }
        if let Some(anonymous_id) = request.anonymous_id {
            return self.authorize_anonymous(anonymous_id, request.endpoint).await;
        }
        self.authorize_first_contact(request.endpoint).await
    }

    async fn authorize_bearer(&self, token: &str) -> Result<AuthContext, AuthError> {
        // Expiry is checked against the session below, not at parse time, so
        // expiry and revocation are distinguishable.
        let claims = self.codec.parse(token, false)?;
        let session_id = Uuid::parse_str(&claims.sid).map_err(|_| AuthError::TokenMalformed)?;

        let session = self
            .sessions
            .get(session_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::LoginRequired)?;
        if !session.valid {
            return Err(AuthError::LoginRequired);
        }
        if claims.exp <= unix_now() || !session.access_fresh {
            return Err(AuthError::TokenExpired);
        }

        Ok(AuthContext::Authenticated {
            session_id,
            identity_id: session.identity_id,
            claims,
        })
    }

    async fn authorize_anonymous(
        &self,
        anonymous_id: &str,
        endpoint: Endpoint,
    ) -> Result<AuthContext, AuthError> {
        // Existence first: an id this service never issued is rejected
        // outright instead of being re-seeded with a fresh quota.
        let usage = self
            .ledger
            .usage(anonymous_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::LoginRequired)?;

        let ceiling = self.ceilings.ceiling(endpoint);
        if usage.count(endpoint.name()) >= ceiling {
            debug!(%anonymous_id, endpoint = %endpoint, ceiling, "anonymous quota exhausted");
            return Err(AuthError::LimitExceeded);
        }

        self.ledger
            .count_call(anonymous_id, endpoint)
            .await
            .map_err(AuthError::Internal)?;
        Ok(AuthContext::Anonymous {
            anonymous_id: anonymous_id.to_string(),
            newly_created: false,
        })
    }

    async fn authorize_first_contact(&self, endpoint: Endpoint) -> Result<AuthContext, AuthError> {
        // A zero ceiling means the endpoint is closed to anonymous callers;
        // never admit unmetered.
        let ceiling = self.ceilings.ceiling(endpoint);
        if ceiling == 0 {
            warn!(endpoint = %endpoint, "endpoint closed to anonymous callers");
            return Err(AuthError::LimitExceeded);
        }

        let anonymous_id = self
            .ledger
            .register_new(endpoint)
            .await
            .map_err(AuthError::Internal)?;
        Ok(AuthContext::Anonymous {
            anonymous_id,
            newly_created: true,
        })
    }
}
