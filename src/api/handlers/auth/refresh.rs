//! Refresh endpoint: rotate the refresh secret and reissue an access token.

use axum::{Json, extract::Extension};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::types::{RefreshRequest, TokenResponse};
use crate::auth::access_token::TokenIdentity;
use crate::auth::error::AuthError;
use crate::auth::gateway::unix_now;
use crate::auth::state::AuthState;

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair issued", body = TokenResponse),
        (status = 401, description = "Refresh secret rejected", body = super::types::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    state: Extension<Arc<AuthState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    // The access token may already be expired; only its signature must hold
    // to learn which session the refresh targets.
    let claims = state.codec().parse(&request.access_token, false)?;
    let session_id = Uuid::parse_str(&claims.sid).map_err(|_| AuthError::TokenMalformed)?;

    let issued = state
        .sessions()
        .rotate(session_id, &request.refresh_token)
        .await?;

    let token_identity = TokenIdentity {
        subject: claims.sub,
        email: claims.email,
        given_name: claims.given_name,
        family_name: claims.family_name,
        email_verified: claims.email_verified,
    };
    let (access_token, _) = state
        .codec()
        .issue(&token_identity, session_id, unix_now())
        .map_err(AuthError::Internal)?;

    info!(session_id = %session_id, "refresh token rotated");
    Ok(Json(TokenResponse {
        access_token,
        refresh_token: issued.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: i64::try_from(state.codec().ttl().as_secs()).unwrap_or(i64::MAX),
        user: None,
    }))
}
