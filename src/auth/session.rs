//! Session registry: the authoritative state machine for signed-in sessions.
//!
//! A session is VALID until explicitly invalidated; INVALID is terminal until
//! a later login reactivates the session with a fresh token pair. Reads go
//! through a short-lived cache because every authenticated request performs a
//! session lookup; every local write drops the cached entry so a logout is
//! visible on the next read. Remote writes are visible within the cache TTL.

use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use super::error::AuthError;
use super::refresh_token;
use crate::storage::{
    IdentityProfile, NewSessionSecrets, ProviderLogin, RotateOutcome, SessionRecord, SessionStore,
};

/// Default read-cache lifetime; bounds how long a revoked session can still
/// be seen as VALID by readers that did not observe the write.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

/// A session plus the refresh secret minted for it. The plaintext leaves the
/// process exactly once, in the response to the login or refresh call.
pub struct IssuedSession {
    pub record: SessionRecord,
    pub refresh_token: String,
}

pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    cache: DashMap<Uuid, (SessionRecord, Instant)>,
    cache_ttl: Duration,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        cache_ttl: Duration,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            cache_ttl,
            access_ttl,
            refresh_ttl,
        }
    }

    fn fresh_secrets(&self) -> Result<(NewSessionSecrets, String)> {
        let issued = refresh_token::issue()?;
        Ok((
            NewSessionSecrets {
                refresh_token_hash: issued.hash,
                access_ttl: self.access_ttl,
                refresh_ttl: self.refresh_ttl,
            },
            issued.plaintext,
        ))
    }

    /// Record a verified login and hand back a usable session.
    ///
    /// The identity's most recent session, if any, is reauthenticated in
    /// place (forced VALID with a fresh token pair); otherwise a new session
    /// is created.
    ///
    /// # Errors
    /// Storage or secret-generation failures only.
    pub async fn login(&self, login: &ProviderLogin) -> Result<IssuedSession> {
        let identity_id = self.store.upsert_identity(login).await?;
        let (secrets, plaintext) = self.fresh_secrets()?;

        let record = match self.store.latest_session(identity_id).await? {
            Some(session_id) => match self.store.reauthenticate(session_id, &secrets).await? {
                Some(record) => record,
                // Deleted between lookup and update; fall through to create.
                None => self.store.create_session(identity_id, &secrets).await?,
            },
            None => self.store.create_session(identity_id, &secrets).await?,
        };

        self.cache.remove(&record.id);
        debug!(session_id = %record.id, "session established");
        Ok(IssuedSession {
            record,
            refresh_token: plaintext,
        })
    }

    /// Rotate the refresh secret of a session, at most once per issued
    /// secret. Also resets the access expiry and forces the session VALID.
    ///
    /// # Errors
    /// `InvalidRefreshToken` when the session is unknown, its refresh expiry
    /// has passed, the presented secret does not match the current hash, or
    /// a concurrent rotation won the swap. `Internal` on storage failure.
    pub async fn rotate(
        &self,
        session_id: Uuid,
        presented_refresh: &str,
    ) -> Result<IssuedSession, AuthError> {
        let current = self
            .store
            .get(session_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if !current.refresh_fresh {
            return Err(AuthError::InvalidRefreshToken);
        }
        if !refresh_token::verify(presented_refresh, &current.refresh_token_hash) {
            return Err(AuthError::InvalidRefreshToken);
        }

        let (secrets, plaintext) = self.fresh_secrets().map_err(AuthError::Internal)?;
        let presented_hash = refresh_token::hash(presented_refresh);
        let outcome = self
            .store
            .rotate_refresh(session_id, &presented_hash, &secrets)
            .await
            .map_err(AuthError::Internal)?;

        self.cache.remove(&session_id);
        match outcome {
            RotateOutcome::Rotated(record) => Ok(IssuedSession {
                record,
                refresh_token: plaintext,
            }),
            RotateOutcome::Stale => Err(AuthError::InvalidRefreshToken),
        }
    }

    /// Cached read; on the hot path of every authenticated request.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn get(&self, session_id: Uuid) -> Result<Option<SessionRecord>> {
        if let Some(entry) = self.cache.get(&session_id) {
            let (record, cached_at) = entry.value();
            if cached_at.elapsed() < self.cache_ttl {
                return Ok(Some(record.clone()));
            }
        }

        let record = self.store.get(session_id).await?;
        match &record {
            Some(record) => {
                self.cache
                    .insert(session_id, (record.clone(), Instant::now()));
            }
            None => {
                self.cache.remove(&session_id);
            }
        }
        Ok(record)
    }

    /// Force one session INVALID. Idempotent.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn invalidate(&self, session_id: Uuid) -> Result<()> {
        self.store.invalidate(session_id).await?;
        self.cache.remove(&session_id);
        Ok(())
    }

    /// Account details from the identity's freshest provider binding.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn profile(&self, identity_id: Uuid) -> Result<Option<IdentityProfile>> {
        self.store.profile(identity_id).await
    }

    /// Force every session of an identity INVALID.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn invalidate_identity(&self, identity_id: Uuid) -> Result<()> {
        self.store.invalidate_all(identity_id).await?;
        self.cache
            .retain(|_, (record, _)| record.identity_id != identity_id);
        Ok(())
    }

    #[must_use]
    pub const fn access_ttl(&self) -> Duration {
        self.access_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_CACHE_TTL, SessionRegistry};
    use crate::auth::error::AuthError;
    use crate::auth::verifier::VerifiedIdentity;
    use crate::storage::memory::MemoryStore;
    use crate::storage::ProviderLogin;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(MemoryStore::new()),
            DEFAULT_CACHE_TTL,
            Duration::from_secs(3600),
            Duration::from_secs(86400),
        )
    }

    fn login_for(subject: &str) -> ProviderLogin {
        ProviderLogin {
            provider: "google".to_string(),
            identity: VerifiedIdentity {
                subject: subject.to_string(),
                email: format!("{subject}@example.com"),
                email_verified: true,
                given_name: "Test".to_string(),
                family_name: "User".to_string(),
                picture: String::new(),
                issuer: "https://accounts.google.com".to_string(),
                issued_at: 0,
                expires_at: 0,
                key_id: "kid".to_string(),
                algorithm: "RS256".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn repeat_login_reauthenticates_same_session() {
        let registry = registry();

        let first = registry.login(&login_for("sub-1")).await.expect("login");
        let second = registry.login(&login_for("sub-1")).await.expect("login");

        assert_eq!(first.record.id, second.record.id);
        assert_ne!(first.refresh_token, second.refresh_token);

        // The first refresh secret died with the reauthentication.
        assert!(matches!(
            registry.rotate(first.record.id, &first.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn rotation_consumes_the_presented_secret() {
        let registry = registry();
        let issued = registry.login(&login_for("sub-1")).await.expect("login");

        let rotated = registry
            .rotate(issued.record.id, &issued.refresh_token)
            .await
            .expect("rotation");
        assert_ne!(rotated.refresh_token, issued.refresh_token);

        // Replay of the consumed secret fails; the new one works once.
        assert!(matches!(
            registry.rotate(issued.record.id, &issued.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
        registry
            .rotate(rotated.record.id, &rotated.refresh_token)
            .await
            .expect("new secret rotates");
    }

    #[tokio::test]
    async fn rotation_revives_an_invalidated_session() {
        let registry = registry();
        let issued = registry.login(&login_for("sub-1")).await.expect("login");

        registry.invalidate(issued.record.id).await.expect("logout");
        let rotated = registry
            .rotate(issued.record.id, &issued.refresh_token)
            .await
            .expect("rotation");
        assert!(rotated.record.valid);
    }

    #[tokio::test]
    async fn invalidate_is_visible_through_the_cache() {
        let registry = registry();
        let issued = registry.login(&login_for("sub-1")).await.expect("login");

        // Prime the cache, then invalidate.
        let cached = registry
            .get(issued.record.id)
            .await
            .expect("get")
            .expect("present");
        assert!(cached.valid);

        registry.invalidate(issued.record.id).await.expect("logout");
        let read = registry
            .get(issued.record.id)
            .await
            .expect("get")
            .expect("present");
        assert!(!read.valid);

        // Idempotent.
        registry.invalidate(issued.record.id).await.expect("logout again");
    }

    #[tokio::test]
    async fn rotate_rejects_unknown_session() {
        let registry = registry();
        assert!(matches!(
            registry.rotate(Uuid::new_v4(), "whatever").await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }
}
