//! Profile endpoint: account details for the authenticated bearer.

use axum::{Json, extract::Extension, http::HeaderMap};
use std::sync::Arc;
use uuid::Uuid;

use super::bearer_token;
use super::types::UserInfo;
use crate::auth::error::AuthError;
use crate::auth::state::AuthState;

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Profile of the authenticated account", body = UserInfo),
        (status = 401, description = "No usable bearer token", body = super::types::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn profile(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> Result<Json<UserInfo>, AuthError> {
    let token = bearer_token(&headers).ok_or(AuthError::LoginRequired)?;
    // Unlike logout, an expired token buys nothing here.
    let claims = state.codec().parse(token, true)?;
    let session_id = Uuid::parse_str(&claims.sid).map_err(|_| AuthError::TokenMalformed)?;

    let session = state
        .sessions()
        .get(session_id)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::LoginRequired)?;
    if !session.valid {
        return Err(AuthError::LoginRequired);
    }

    let binding = state
        .sessions()
        .profile(session.identity_id)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::LoginRequired)?;

    let name = format!("{} {}", binding.given_name, binding.family_name)
        .trim()
        .to_string();
    Ok(Json(UserInfo {
        id: binding.identity_id.to_string(),
        email: binding.email,
        name,
        picture: Some(binding.picture).filter(|p| !p.is_empty()),
    }))
}
