//! Auth endpoints: login, refresh, and logout.
//!
//! Login exchanges a Google ID token for a session-backed token pair. The
//! refresh and logout flows identify the session through the presented
//! access token, which is allowed to be expired for both.

use axum::http::{HeaderMap, header::AUTHORIZATION};

pub(crate) mod login;
pub(crate) mod logout;
pub(crate) mod profile;
pub(crate) mod refresh;
pub(crate) mod types;

#[cfg(test)]
mod tests;

/// Bearer token from the `Authorization` header, if any.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}
