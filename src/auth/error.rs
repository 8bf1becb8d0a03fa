//! Typed failure taxonomy for the auth core.
//!
//! Every component returns one of these kinds instead of using errors as
//! control flow; the transport layer maps each kind to a caller-visible
//! status and a machine-readable code/reason pair.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Login names an identity vendor this service does not federate with.
    #[error("authentication vendor {0} is not supported")]
    UnsupportedVendor(String),
    /// Identity-assertion signature, issuer, or expiry check failed.
    #[error("identity assertion invalid")]
    InvalidCredential,
    /// Assertion audience differs from the configured audience.
    #[error("identity assertion audience mismatch")]
    AudienceMismatch,
    /// Assertion verified but lacks a claim the core requires.
    #[error("identity assertion missing required claim: {0}")]
    MissingRequiredClaim(&'static str),
    /// Access token failed structural or signature checks.
    #[error("access token malformed")]
    TokenMalformed,
    /// Access token expired; the client may attempt a refresh.
    #[error("access token expired")]
    TokenExpired,
    /// Session absent or revoked, or anonymous id unrecognized.
    #[error("login required")]
    LoginRequired,
    /// Anonymous-quota ceiling or rate-limiter ceiling reached.
    #[error("usage limit exceeded")]
    LimitExceeded,
    /// Presented refresh secret does not match the stored hash, or expired.
    #[error("refresh token invalid or expired")]
    InvalidRefreshToken,
    /// Storage or crypto infrastructure failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Machine-readable code surfaced to clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedVendor(_) => "UNSUPPORTED_VENDOR",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::AudienceMismatch => "AUDIENCE_MISMATCH",
            Self::MissingRequiredClaim(_) => "MISSING_REQUIRED_CLAIM",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::LoginRequired => "LOGIN_REQUIRED",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
