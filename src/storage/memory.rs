//! In-memory storage backend.
//!
//! Mirrors the Postgres backend's observable behavior closely enough to
//! exercise the session registry, usage ledger, and gateway without a
//! database. Not intended for production use.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

use super::{
    IdentityProfile, NewSessionSecrets, ProviderLogin, RotateOutcome, SessionRecord, SessionStore,
    UsageCounts, UsageStore,
};

struct MemSession {
    identity_id: Uuid,
    valid: bool,
    refresh_token_hash: Vec<u8>,
    access_expires_at: Instant,
    refresh_expires_at: Instant,
    created_seq: u64,
}

impl MemSession {
    fn record(&self, id: Uuid) -> SessionRecord {
        let now = Instant::now();
        SessionRecord {
            id,
            identity_id: self.identity_id,
            valid: self.valid,
            refresh_token_hash: self.refresh_token_hash.clone(),
            access_fresh: now < self.access_expires_at,
            refresh_fresh: now < self.refresh_expires_at,
        }
    }

    fn apply(&mut self, secrets: &NewSessionSecrets) {
        let now = Instant::now();
        self.valid = true;
        self.refresh_token_hash = secrets.refresh_token_hash.clone();
        self.access_expires_at = now + secrets.access_ttl;
        self.refresh_expires_at = now + secrets.refresh_ttl;
    }
}

#[derive(Default)]
struct Inner {
    bindings: HashMap<(String, String), Uuid>,
    profiles: HashMap<Uuid, IdentityProfile>,
    sessions: HashMap<Uuid, MemSession>,
    callers: HashMap<String, HashMap<String, u32>>,
    next_seq: u64,
}

/// Process-local store implementing both persistence contracts.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert_identity(&self, login: &ProviderLogin) -> Result<Uuid> {
        let mut inner = self.lock();
        let key = (login.provider.clone(), login.identity.subject.clone());
        let identity_id = *inner.bindings.entry(key).or_insert_with(Uuid::new_v4);
        // Like the binding row, the profile keeps the freshest claims.
        let id = &login.identity;
        inner.profiles.insert(
            identity_id,
            IdentityProfile {
                identity_id,
                email: id.email.clone(),
                email_verified: id.email_verified,
                given_name: id.given_name.clone(),
                family_name: id.family_name.clone(),
                picture: id.picture.clone(),
            },
        );
        Ok(identity_id)
    }

    async fn profile(&self, identity_id: Uuid) -> Result<Option<IdentityProfile>> {
        let inner = self.lock();
        Ok(inner.profiles.get(&identity_id).cloned())
    }

    async fn latest_session(&self, identity_id: Uuid) -> Result<Option<Uuid>> {
        let inner = self.lock();
        Ok(inner
            .sessions
            .iter()
            .filter(|(_, session)| session.identity_id == identity_id)
            .max_by_key(|(_, session)| session.created_seq)
            .map(|(id, _)| *id))
    }

    async fn create_session(
        &self,
        identity_id: Uuid,
        secrets: &NewSessionSecrets,
    ) -> Result<SessionRecord> {
        let mut inner = self.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let id = Uuid::new_v4();
        let now = Instant::now();
        let session = MemSession {
            identity_id,
            valid: true,
            refresh_token_hash: secrets.refresh_token_hash.clone(),
            access_expires_at: now + secrets.access_ttl,
            refresh_expires_at: now + secrets.refresh_ttl,
            created_seq: seq,
        };
        let record = session.record(id);
        inner.sessions.insert(id, session);
        Ok(record)
    }

    async fn reauthenticate(
        &self,
        session_id: Uuid,
        secrets: &NewSessionSecrets,
    ) -> Result<Option<SessionRecord>> {
        let mut inner = self.lock();
        Ok(inner.sessions.get_mut(&session_id).map(|session| {
            session.apply(secrets);
            session.record(session_id)
        }))
    }

    async fn rotate_refresh(
        &self,
        session_id: Uuid,
        presented_hash: &[u8],
        secrets: &NewSessionSecrets,
    ) -> Result<RotateOutcome> {
        let mut inner = self.lock();
        let Some(session) = inner.sessions.get_mut(&session_id) else {
            return Ok(RotateOutcome::Stale);
        };
        if session.refresh_token_hash != presented_hash
            || Instant::now() >= session.refresh_expires_at
        {
            return Ok(RotateOutcome::Stale);
        }
        session.apply(secrets);
        Ok(RotateOutcome::Rotated(session.record(session_id)))
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<SessionRecord>> {
        let inner = self.lock();
        Ok(inner
            .sessions
            .get(&session_id)
            .map(|session| session.record(session_id)))
    }

    async fn invalidate(&self, session_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            session.valid = false;
        }
        Ok(())
    }

    async fn invalidate_all(&self, identity_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        for session in inner.sessions.values_mut() {
            if session.identity_id == identity_id {
                session.valid = false;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn get_usage(&self, anon_id: &str) -> Result<Option<UsageCounts>> {
        let inner = self.lock();
        Ok(inner
            .callers
            .get(anon_id)
            .map(|counts| UsageCounts::new(counts.clone())))
    }

    async fn create(&self, anon_id: &str, first_endpoint: &str) -> Result<()> {
        let mut inner = self.lock();
        let counts = inner.callers.entry(anon_id.to_string()).or_default();
        *counts.entry(first_endpoint.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn increment(&self, anon_id: &str, endpoint: &str) -> Result<()> {
        let mut inner = self.lock();
        let counts = inner.callers.entry(anon_id.to_string()).or_default();
        *counts.entry(endpoint.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::storage::{NewSessionSecrets, RotateOutcome, SessionStore, UsageStore};
    use std::time::Duration;
    use uuid::Uuid;

    fn secrets(hash: &[u8]) -> NewSessionSecrets {
        NewSessionSecrets {
            refresh_token_hash: hash.to_vec(),
            access_ttl: Duration::from_secs(3600),
            refresh_ttl: Duration::from_secs(86400),
        }
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let store = MemoryStore::new();
        let identity = Uuid::new_v4();

        let created = store
            .create_session(identity, &secrets(b"hash-1"))
            .await
            .expect("create");
        assert!(created.valid);
        assert!(created.access_fresh);
        assert!(created.refresh_fresh);

        assert_eq!(
            store.latest_session(identity).await.expect("latest"),
            Some(created.id)
        );

        store.invalidate(created.id).await.expect("invalidate");
        let read = store
            .get(created.id)
            .await
            .expect("get")
            .expect("session exists");
        assert!(!read.valid);

        // Second invalidation is a no-op success.
        store.invalidate(created.id).await.expect("invalidate again");
    }

    #[tokio::test]
    async fn rotation_is_compare_and_swap() {
        let store = MemoryStore::new();
        let identity = Uuid::new_v4();
        let created = store
            .create_session(identity, &secrets(b"hash-1"))
            .await
            .expect("create");

        let outcome = store
            .rotate_refresh(created.id, b"hash-1", &secrets(b"hash-2"))
            .await
            .expect("rotate");
        assert!(matches!(outcome, RotateOutcome::Rotated(_)));

        // The prior hash no longer matches.
        let outcome = store
            .rotate_refresh(created.id, b"hash-1", &secrets(b"hash-3"))
            .await
            .expect("rotate");
        assert!(matches!(outcome, RotateOutcome::Stale));
    }

    #[tokio::test]
    async fn profile_tracks_the_freshest_claims() {
        use crate::auth::verifier::VerifiedIdentity;
        use crate::storage::ProviderLogin;

        let login = |email: &str, picture: &str| ProviderLogin {
            provider: "google".to_string(),
            identity: VerifiedIdentity {
                subject: "sub-1".to_string(),
                email: email.to_string(),
                email_verified: true,
                given_name: "Alice".to_string(),
                family_name: "Example".to_string(),
                picture: picture.to_string(),
                issuer: "https://accounts.google.com".to_string(),
                issued_at: 0,
                expires_at: 0,
                key_id: "kid".to_string(),
                algorithm: "RS256".to_string(),
            },
        };

        let store = MemoryStore::new();
        let identity_id = store
            .upsert_identity(&login("alice@example.com", ""))
            .await
            .expect("upsert");
        let same_id = store
            .upsert_identity(&login("alice@new.example.com", "https://p.example/a.png"))
            .await
            .expect("upsert again");
        assert_eq!(identity_id, same_id);

        let profile = store
            .profile(identity_id)
            .await
            .expect("profile")
            .expect("known identity");
        assert_eq!(profile.email, "alice@new.example.com");
        assert_eq!(profile.picture, "https://p.example/a.png");

        assert!(
            store
                .profile(Uuid::new_v4())
                .await
                .expect("profile")
                .is_none()
        );
    }

    #[tokio::test]
    async fn usage_counters_per_endpoint() {
        let store = MemoryStore::new();
        assert!(store.get_usage("anon-1").await.expect("usage").is_none());

        store.create("anon-1", "simplify").await.expect("create");
        store.increment("anon-1", "simplify").await.expect("incr");
        store.increment("anon-1", "translate").await.expect("incr");

        let usage = store
            .get_usage("anon-1")
            .await
            .expect("usage")
            .expect("known caller");
        assert_eq!(usage.count("simplify"), 2);
        assert_eq!(usage.count("translate"), 1);
        assert_eq!(usage.count("summarise"), 0);
    }
}
