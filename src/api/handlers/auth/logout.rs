//! Logout endpoint: invalidate the bearer's session.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::bearer_token;
use super::types::LogoutRequest;
use crate::auth::error::AuthError;
use crate::auth::state::AuthState;

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Session invalidated"),
        (status = 401, description = "No usable bearer token", body = super::types::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    body: Option<Json<LogoutRequest>>,
) -> Result<StatusCode, AuthError> {
    let token = bearer_token(&headers).ok_or(AuthError::LoginRequired)?;
    // An expired token still names the session to invalidate.
    let claims = state.codec().parse(token, false)?;
    let session_id = Uuid::parse_str(&claims.sid).map_err(|_| AuthError::TokenMalformed)?;

    let all_devices = body.is_some_and(|Json(request)| request.all_devices);
    if all_devices {
        // Resolve the identity behind this session, then revoke everywhere.
        let session = state
            .sessions()
            .get(session_id)
            .await
            .map_err(AuthError::Internal)?;
        if let Some(session) = session {
            state
                .sessions()
                .invalidate_identity(session.identity_id)
                .await
                .map_err(AuthError::Internal)?;
        }
    } else {
        state
            .sessions()
            .invalidate(session_id)
            .await
            .map_err(AuthError::Internal)?;
    }

    info!(session_id = %session_id, all_devices, "logout");
    Ok(StatusCode::NO_CONTENT)
}
