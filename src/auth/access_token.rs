//! Signed, self-contained access token codec.
//!
//! The token embeds identity claims plus a session reference (`sid`) so the
//! identity can be read without a database hit, but authorization still
//! requires a live session lookup: an issued token can only be revoked through
//! the session's validity flag.
//!
//! Verification always checks the signature and pins the configured algorithm;
//! expiry verification is optional because logout and refresh must be able to
//! read an already-expired token to learn which session it references.

use anyhow::{Result, anyhow};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::error::AuthError;

/// Claims embedded in every issued access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// External-provider subject of the signed-in identity.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub email_verified: bool,
    /// Session id this token was issued under.
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Identity fields carried into a new token at issuance.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    pub subject: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub email_verified: bool,
}

/// Stateless issue/parse codec over a configured HMAC algorithm and secret.
pub struct AccessTokenCodec {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl AccessTokenCodec {
    /// Build a codec from the configured signing secret and algorithm.
    ///
    /// # Errors
    /// Returns an error for a non-HMAC algorithm; the secret-based key scheme
    /// only supports the HS family.
    pub fn new(secret: &SecretString, algorithm: Algorithm, ttl: Duration) -> Result<Self> {
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(anyhow!(
                "unsupported access-token algorithm {algorithm:?}: expected HS256, HS384, or HS512"
            ));
        }
        let secret = secret.expose_secret().as_bytes();
        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        })
    }

    /// Configured token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a signed token for `identity` under `session_id`.
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails.
    pub fn issue(
        &self,
        identity: &TokenIdentity,
        session_id: Uuid,
        issued_at: i64,
    ) -> Result<(String, i64)> {
        let expires_at = issued_at + i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = AccessClaims {
            sub: identity.subject.clone(),
            email: identity.email.clone(),
            given_name: identity.given_name.clone(),
            family_name: identity.family_name.clone(),
            email_verified: identity.email_verified,
            sid: session_id.to_string(),
            iat: issued_at,
            exp: expires_at,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|err| anyhow!("failed to sign access token: {err}"))?;
        Ok((token, expires_at))
    }

    /// Decode and verify a token. The signature and algorithm are always
    /// checked; expiry only when `verify_expiry` is set.
    ///
    /// # Errors
    /// `TokenExpired` when expiry verification is requested and the token has
    /// expired; `TokenMalformed` for every structural or signature failure.
    pub fn parse(&self, token: &str, verify_expiry: bool) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = verify_expiry;
        validation.validate_aud = false;
        if !verify_expiry {
            validation.required_spec_claims.clear();
        }

        match decode::<AccessClaims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
                _ => Err(AuthError::TokenMalformed),
            },
        }
    }
}
