//! Postgres backend for sessions, identities, and anonymous usage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    IdentityProfile, NewSessionSecrets, ProviderLogin, RotateOutcome, SessionRecord, SessionStore,
    UsageCounts, UsageStore,
};

/// Shared Postgres store; implements both persistence contracts over one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = r"
    id, identity_id, valid, refresh_token_hash,
    access_token_expires_at > NOW() AS access_fresh,
    refresh_token_expires_at > NOW() AS refresh_fresh
";

fn session_from_row(row: &PgRow) -> SessionRecord {
    SessionRecord {
        id: row.get("id"),
        identity_id: row.get("identity_id"),
        valid: row.get("valid"),
        refresh_token_hash: row.get("refresh_token_hash"),
        access_fresh: row.get("access_fresh"),
        refresh_fresh: row.get("refresh_fresh"),
    }
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(sqlx::error::DatabaseError::code)
        .is_some_and(|code| code == "23505")
}

async fn lookup_binding(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    provider: &str,
    subject: &str,
) -> Result<Option<Uuid>> {
    let query = r"
        SELECT identity_id
        FROM identity_bindings
        WHERE provider = $1 AND subject = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(provider)
        .bind(subject)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup identity binding")?;
    Ok(row.map(|row| row.get("identity_id")))
}

async fn refresh_binding(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    login: &ProviderLogin,
) -> Result<()> {
    // Bindings keep the freshest claims from the most recent login.
    let query = r"
        UPDATE identity_bindings
        SET issuer = $3,
            email = $4,
            email_verified = $5,
            given_name = $6,
            family_name = $7,
            picture = $8,
            token_issued_at = $9,
            token_expires_at = $10,
            key_id = $11,
            algorithm = $12,
            updated_at = NOW()
        WHERE provider = $1 AND subject = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let id = &login.identity;
    sqlx::query(query)
        .bind(&login.provider)
        .bind(&id.subject)
        .bind(&id.issuer)
        .bind(&id.email)
        .bind(id.email_verified)
        .bind(&id.given_name)
        .bind(&id.family_name)
        .bind(&id.picture)
        .bind(id.issued_at)
        .bind(id.expires_at)
        .bind(&id.key_id)
        .bind(&id.algorithm)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to refresh identity binding")?;
    Ok(())
}

#[async_trait]
impl SessionStore for PgStore {
    async fn upsert_identity(&self, login: &ProviderLogin) -> Result<Uuid> {
        // Identity and binding creation stay in one transaction; a racing
        // first login for the same subject loses on the unique (provider,
        // subject) index and falls back to the winner's identity.
        let mut tx = self.pool.begin().await.context("begin login transaction")?;

        if let Some(identity_id) =
            lookup_binding(&mut tx, &login.provider, &login.identity.subject).await?
        {
            refresh_binding(&mut tx, login).await?;
            tx.commit().await.context("commit binding refresh")?;
            return Ok(identity_id);
        }

        let query = "INSERT INTO identities DEFAULT VALUES RETURNING id";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert identity")?;
        let identity_id: Uuid = row.get("id");

        let query = r"
            INSERT INTO identity_bindings
                (identity_id, provider, subject, issuer, email, email_verified,
                 given_name, family_name, picture, token_issued_at,
                 token_expires_at, key_id, algorithm)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let id = &login.identity;
        let result = sqlx::query(query)
            .bind(identity_id)
            .bind(&login.provider)
            .bind(&id.subject)
            .bind(&id.issuer)
            .bind(&id.email)
            .bind(id.email_verified)
            .bind(&id.given_name)
            .bind(&id.family_name)
            .bind(&id.picture)
            .bind(id.issued_at)
            .bind(id.expires_at)
            .bind(&id.key_id)
            .bind(&id.algorithm)
            .execute(&mut *tx)
            .instrument(span)
            .await;

        match result {
            Ok(_) => {
                tx.commit().await.context("commit identity creation")?;
                Ok(identity_id)
            }
            Err(err) if is_unique_violation(&err) => {
                let _ = tx.rollback().await;
                let mut tx = self.pool.begin().await.context("begin login retry")?;
                let identity_id =
                    lookup_binding(&mut tx, &login.provider, &login.identity.subject)
                        .await?
                        .context("binding vanished after unique violation")?;
                refresh_binding(&mut tx, login).await?;
                tx.commit().await.context("commit binding refresh")?;
                Ok(identity_id)
            }
            Err(err) => Err(err).context("failed to insert identity binding"),
        }
    }

    async fn latest_session(&self, identity_id: Uuid) -> Result<Option<Uuid>> {
        let query = r"
            SELECT id
            FROM sessions
            WHERE identity_id = $1
            ORDER BY created_at DESC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup latest session")?;
        Ok(row.map(|row| row.get("id")))
    }

    async fn profile(&self, identity_id: Uuid) -> Result<Option<IdentityProfile>> {
        let query = r"
            SELECT identity_id, email, email_verified, given_name, family_name, picture
            FROM identity_bindings
            WHERE identity_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity profile")?;
        Ok(row.map(|row| IdentityProfile {
            identity_id: row.get("identity_id"),
            email: row.get("email"),
            email_verified: row.get("email_verified"),
            given_name: row.get::<Option<String>, _>("given_name").unwrap_or_default(),
            family_name: row.get::<Option<String>, _>("family_name").unwrap_or_default(),
            picture: row.get::<Option<String>, _>("picture").unwrap_or_default(),
        }))
    }

    async fn create_session(
        &self,
        identity_id: Uuid,
        secrets: &NewSessionSecrets,
    ) -> Result<SessionRecord> {
        let query = format!(
            r"
            INSERT INTO sessions
                (identity_id, valid, refresh_token_hash,
                 access_token_expires_at, refresh_token_expires_at)
            VALUES ($1, TRUE, $2,
                    NOW() + ($3 * INTERVAL '1 second'),
                    NOW() + ($4 * INTERVAL '1 second'))
            RETURNING {SESSION_COLUMNS}
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(identity_id)
            .bind(&secrets.refresh_token_hash)
            .bind(ttl_seconds(secrets.access_ttl))
            .bind(ttl_seconds(secrets.refresh_ttl))
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(session_from_row(&row))
    }

    async fn reauthenticate(
        &self,
        session_id: Uuid,
        secrets: &NewSessionSecrets,
    ) -> Result<Option<SessionRecord>> {
        let query = format!(
            r"
            UPDATE sessions
            SET valid = TRUE,
                refresh_token_hash = $2,
                access_token_expires_at = NOW() + ($3 * INTERVAL '1 second'),
                refresh_token_expires_at = NOW() + ($4 * INTERVAL '1 second'),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .bind(&secrets.refresh_token_hash)
            .bind(ttl_seconds(secrets.access_ttl))
            .bind(ttl_seconds(secrets.refresh_ttl))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to reauthenticate session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn rotate_refresh(
        &self,
        session_id: Uuid,
        presented_hash: &[u8],
        secrets: &NewSessionSecrets,
    ) -> Result<RotateOutcome> {
        // Compare-and-swap on the stored hash: of two concurrent rotations
        // with the same prior secret, exactly one matches and commits.
        let query = format!(
            r"
            UPDATE sessions
            SET valid = TRUE,
                refresh_token_hash = $3,
                access_token_expires_at = NOW() + ($4 * INTERVAL '1 second'),
                refresh_token_expires_at = NOW() + ($5 * INTERVAL '1 second'),
                updated_at = NOW()
            WHERE id = $1
              AND refresh_token_hash = $2
              AND refresh_token_expires_at > NOW()
            RETURNING {SESSION_COLUMNS}
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .bind(presented_hash)
            .bind(&secrets.refresh_token_hash)
            .bind(ttl_seconds(secrets.access_ttl))
            .bind(ttl_seconds(secrets.refresh_ttl))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to rotate refresh token")?;

        Ok(row
            .as_ref()
            .map_or(RotateOutcome::Stale, |row| {
                RotateOutcome::Rotated(session_from_row(row))
            }))
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<SessionRecord>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn invalidate(&self, session_id: Uuid) -> Result<()> {
        // Idempotent; invalidating an unknown or already-INVALID session
        // matches zero or one rows and succeeds either way.
        let query = "UPDATE sessions SET valid = FALSE, updated_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to invalidate session")?;
        Ok(())
    }

    async fn invalidate_all(&self, identity_id: Uuid) -> Result<()> {
        let query = "UPDATE sessions SET valid = FALSE, updated_at = NOW() WHERE identity_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to invalidate identity sessions")?;
        Ok(())
    }
}

#[async_trait]
impl UsageStore for PgStore {
    async fn get_usage(&self, anon_id: &str) -> Result<Option<UsageCounts>> {
        // The left join distinguishes an unknown id (no rows) from a known
        // id that has no counters yet (one row with NULL endpoint).
        let query = r"
            SELECT anonymous_usage.endpoint, anonymous_usage.calls
            FROM anonymous_callers
            LEFT JOIN anonymous_usage USING (anonymous_id)
            WHERE anonymous_callers.anonymous_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(anon_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup anonymous usage")?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut counts = std::collections::HashMap::new();
        for row in &rows {
            let endpoint: Option<String> = row.get("endpoint");
            if let Some(endpoint) = endpoint {
                let calls: i64 = row.get("calls");
                counts.insert(endpoint, u32::try_from(calls).unwrap_or(u32::MAX));
            }
        }
        Ok(Some(UsageCounts::new(counts)))
    }

    async fn create(&self, anon_id: &str, first_endpoint: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin anonymous-caller transaction")?;

        let query = "INSERT INTO anonymous_callers (anonymous_id) VALUES ($1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(anon_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert anonymous caller")?;

        let query = r"
            INSERT INTO anonymous_usage (anonymous_id, endpoint, calls)
            VALUES ($1, $2, 1)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(anon_id)
            .bind(first_endpoint)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert first usage counter")?;

        tx.commit().await.context("commit anonymous caller")?;
        Ok(())
    }

    async fn increment(&self, anon_id: &str, endpoint: &str) -> Result<()> {
        // Upsert keeps the increment atomic under concurrent calls from the
        // same anonymous id, and starts counters for unseen endpoint names.
        let query = r"
            INSERT INTO anonymous_usage (anonymous_id, endpoint, calls)
            VALUES ($1, $2, 1)
            ON CONFLICT (anonymous_id, endpoint)
            DO UPDATE SET calls = anonymous_usage.calls + 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(anon_id)
            .bind(endpoint)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to increment usage counter")?;

        let query = "UPDATE anonymous_callers SET last_seen_at = NOW() WHERE anonymous_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(anon_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to touch anonymous caller")?;
        Ok(())
    }
}
