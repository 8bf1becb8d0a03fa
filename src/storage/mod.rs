//! Durable storage contracts for sessions and anonymous usage.
//!
//! The auth core talks to storage exclusively through these traits so the
//! session registry, ledger, and gateway can be exercised against the
//! in-memory backend without a database.

pub mod memory;
pub mod pg;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::verifier::VerifiedIdentity;

/// A verified external login to record: the provider name plus the claims
/// extracted from its credential.
#[derive(Debug, Clone)]
pub struct ProviderLogin {
    pub provider: String,
    pub identity: VerifiedIdentity,
}

/// Secrets and lifetimes for a freshly issued session token pair. Expiry
/// instants are computed by the backend at write time.
#[derive(Debug, Clone)]
pub struct NewSessionSecrets {
    pub refresh_token_hash: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// A session row as read back from storage.
///
/// Expiries are surfaced as freshness flags evaluated at read time by the
/// backend, so callers never compare wall clocks themselves.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub valid: bool,
    pub refresh_token_hash: Vec<u8>,
    /// Access-token expiry has not passed.
    pub access_fresh: bool,
    /// Refresh-token expiry has not passed.
    pub refresh_fresh: bool,
}

/// Result of a compare-and-swap refresh rotation.
#[derive(Debug, Clone)]
pub enum RotateOutcome {
    /// The presented hash matched the current one and the swap committed.
    Rotated(SessionRecord),
    /// The session is gone, its refresh expiry passed, or another rotation
    /// committed first.
    Stale,
}

/// Account details from an identity's most recently refreshed binding.
#[derive(Debug, Clone)]
pub struct IdentityProfile {
    pub identity_id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub given_name: String,
    pub family_name: String,
    pub picture: String,
}

/// Session and identity persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a verified login: create the identity on first contact, and
    /// create or refresh its provider binding with the newest claims. Both
    /// writes commit in one transaction. Returns the identity id.
    async fn upsert_identity(&self, login: &ProviderLogin) -> Result<Uuid>;

    /// Most recently created session for an identity, if any.
    async fn latest_session(&self, identity_id: Uuid) -> Result<Option<Uuid>>;

    /// Account details from the identity's freshest provider binding.
    async fn profile(&self, identity_id: Uuid) -> Result<Option<IdentityProfile>>;

    /// Create a new VALID session for an identity.
    async fn create_session(
        &self,
        identity_id: Uuid,
        secrets: &NewSessionSecrets,
    ) -> Result<SessionRecord>;

    /// Force an existing session back to VALID with a fresh token pair,
    /// overwriting the previous secrets and expiries.
    async fn reauthenticate(
        &self,
        session_id: Uuid,
        secrets: &NewSessionSecrets,
    ) -> Result<Option<SessionRecord>>;

    /// Atomically swap the refresh hash: commits only if the stored hash
    /// still equals `presented_hash` and its expiry has not passed. Also
    /// resets the access expiry and forces the session VALID.
    async fn rotate_refresh(
        &self,
        session_id: Uuid,
        presented_hash: &[u8],
        secrets: &NewSessionSecrets,
    ) -> Result<RotateOutcome>;

    async fn get(&self, session_id: Uuid) -> Result<Option<SessionRecord>>;

    /// Mark one session INVALID. Idempotent; unknown ids are a no-op.
    async fn invalidate(&self, session_id: Uuid) -> Result<()>;

    /// Mark every session of an identity INVALID.
    async fn invalidate_all(&self, identity_id: Uuid) -> Result<()>;
}

/// Per-endpoint call counters for one anonymous caller.
#[derive(Debug, Clone, Default)]
pub struct UsageCounts {
    counts: HashMap<String, u32>,
}

impl UsageCounts {
    #[must_use]
    pub fn new(counts: HashMap<String, u32>) -> Self {
        Self { counts }
    }

    /// Calls recorded for `endpoint`; endpoints never called count as 0.
    #[must_use]
    pub fn count(&self, endpoint: &str) -> u32 {
        self.counts.get(endpoint).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn into_inner(self) -> HashMap<String, u32> {
        self.counts
    }
}

/// Anonymous-caller usage persistence.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Counters for a known anonymous id, or `None` if the id was never
    /// issued by this service.
    async fn get_usage(&self, anon_id: &str) -> Result<Option<UsageCounts>>;

    /// Register a new anonymous caller with its first call to
    /// `first_endpoint` already counted.
    async fn create(&self, anon_id: &str, first_endpoint: &str) -> Result<()>;

    /// Atomically add one call to `(anon_id, endpoint)`. Unseen endpoint
    /// names start a new counter rather than failing.
    async fn increment(&self, anon_id: &str, endpoint: &str) -> Result<()>;
}
