//! # Wordgate (Authentication & Quota Core)
//!
//! `wordgate` is the authentication and quota core of a text-processing API.
//! For every inbound request it decides who is calling (a signed-in user, a
//! recognized anonymous caller, or a brand-new anonymous caller) and whether
//! the call may proceed.
//!
//! ## Credentials
//!
//! Sign-in delegates identity verification to an external OAuth issuer
//! (Google ID tokens). On login the service mints a short-lived, self-contained
//! access token (JWT, HMAC-signed) referencing a server-side session row, plus
//! an opaque refresh token whose salted hash is the only thing persisted.
//!
//! - **Access tokens** are self-contained but not self-sufficient: every
//!   authenticated request still resolves the referenced session, because an
//!   issued token can only be revoked through the session's validity flag.
//! - **Refresh tokens** rotate on every use; a replayed secret fails the hash
//!   comparison after the first legitimate rotation.
//!
//! ## Quotas
//!
//! Anonymous callers are tracked by an opaque id and metered per endpoint
//! against configured ceilings. The metered endpoint space is a closed
//! enumeration; ceiling configuration is validated at startup so an unmapped
//! endpoint is a configuration error, never a runtime surprise.
//!
//! A seconds-scale sliding-window rate limiter keyed by caller address and
//! endpoint runs in front of the identity system for all metered traffic.

pub mod api;
pub mod auth;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
