//! External credential verification.
//!
//! Validates a provider-signed ID token against the provider's published
//! signing keys, its known issuers, and the configured audience, then
//! extracts the stable external identity. Pure check, no side effects beyond
//! the key cache.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::error::AuthError;
use super::jwks::JwksCache;

/// Google's JWKS document for ID-token signing keys.
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Issuer values Google uses interchangeably in ID tokens.
pub const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Raw claim set of a provider ID token.
///
/// `sub` and `email` are optional here so their absence surfaces as a
/// missing-claim error rather than a deserialization failure.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    aud: String,
    sub: Option<String>,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
    #[serde(default)]
    picture: String,
    #[serde(default)]
    iss: String,
    #[serde(default)]
    iat: i64,
    #[serde(default)]
    exp: i64,
}

/// Identity extracted from a successfully verified credential, including the
/// audit fields persisted on the provider binding.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub given_name: String,
    pub family_name: String,
    pub picture: String,
    pub issuer: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub key_id: String,
    pub algorithm: String,
}

/// Verifies Google ID tokens against the configured OAuth client id.
pub struct CredentialVerifier {
    jwks: JwksCache,
    audience: String,
    issuers: Vec<String>,
}

impl CredentialVerifier {
    /// Build a verifier for Google-issued credentials.
    ///
    /// # Panics
    /// Never: the JWKS URL is a compile-time constant known to parse.
    #[must_use]
    pub fn google(client: reqwest::Client, audience: String) -> Self {
        let url = Url::parse(GOOGLE_JWKS_URL).expect("static JWKS URL parses");
        Self {
            jwks: JwksCache::new(client, url, JWKS_CACHE_TTL),
            audience,
            issuers: GOOGLE_ISSUERS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Verify `assertion` and extract its identity.
    ///
    /// # Errors
    /// `InvalidCredential` when the header, signature, issuer, or expiry
    /// check fails or no signing key matches; `AudienceMismatch` when the
    /// audience claim differs from the configured one; `MissingRequiredClaim`
    /// when `sub` or `email` is absent; `Internal` when the key endpoint is
    /// unreachable.
    pub async fn verify(&self, assertion: &str) -> Result<VerifiedIdentity, AuthError> {
        let header = decode_header(assertion).map_err(|err| {
            debug!("credential header rejected: {err}");
            AuthError::InvalidCredential
        })?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidCredential);
        }
        let kid = header.kid.ok_or(AuthError::InvalidCredential)?;

        let key = self
            .jwks
            .key_for(&kid)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidCredential)?;

        check_assertion(assertion, &key, &self.audience, &self.issuers, &kid)
    }
}

/// Signature, issuer, expiry, audience, and required-claims checks against a
/// resolved key. The audience comparison is explicit and exact, and runs even
/// for an otherwise fully valid signature.
fn check_assertion(
    assertion: &str,
    key: &DecodingKey,
    audience: &str,
    issuers: &[String],
    kid: &str,
) -> Result<VerifiedIdentity, AuthError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(issuers);
    validation.validate_aud = false;

    let claims = decode::<IdTokenClaims>(assertion, key, &validation)
        .map_err(|err| {
            debug!("credential verification failed: {err}");
            AuthError::InvalidCredential
        })?
        .claims;

    if claims.aud != audience {
        return Err(AuthError::AudienceMismatch);
    }

    let subject = match claims.sub {
        Some(sub) if !sub.is_empty() => sub,
        _ => return Err(AuthError::MissingRequiredClaim("sub")),
    };
    let email = match claims.email {
        Some(email) if !email.is_empty() => email,
        _ => return Err(AuthError::MissingRequiredClaim("email")),
    };

    Ok(VerifiedIdentity {
        subject,
        email,
        email_verified: claims.email_verified,
        given_name: claims.given_name,
        family_name: claims.family_name,
        picture: claims.picture,
        issuer: claims.iss,
        issued_at: claims.iat,
        expires_at: claims.exp,
        key_id: kid.to_string(),
        algorithm: "RS256".to_string(),
    })
}
