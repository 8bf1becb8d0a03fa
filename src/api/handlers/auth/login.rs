//! Login endpoint: exchange a provider ID token for a session token pair.

use axum::{Json, extract::Extension};
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{LoginRequest, TokenResponse, UserInfo};
use crate::auth::access_token::TokenIdentity;
use crate::auth::error::AuthError;
use crate::auth::gateway::unix_now;
use crate::auth::state::AuthState;
use crate::auth::verifier::VerifiedIdentity;
use crate::storage::ProviderLogin;

const SUPPORTED_VENDOR: &str = "google";

/// Display name from the verified claims, matching the convention clients
/// already render: given + family, collapsed when either is empty.
pub(super) fn display_name(identity: &VerifiedIdentity) -> String {
    format!("{} {}", identity.given_name, identity.family_name)
        .trim()
        .to_string()
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credential accepted, session established", body = TokenResponse),
        (status = 401, description = "Credential rejected", body = super::types::ErrorBody),
        (status = 404, description = "Unsupported identity vendor", body = super::types::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    // Clients send the vendor in enum spelling ("GOOGLE"); accept any casing
    // and store the provider normalized.
    if !request.vendor.eq_ignore_ascii_case(SUPPORTED_VENDOR) {
        debug!(vendor = request.vendor, "unsupported identity vendor");
        return Err(AuthError::UnsupportedVendor(request.vendor));
    }

    let identity = state.verifier().verify(&request.id_token).await?;
    let token_identity = TokenIdentity {
        subject: identity.subject.clone(),
        email: identity.email.clone(),
        given_name: identity.given_name.clone(),
        family_name: identity.family_name.clone(),
        email_verified: identity.email_verified,
    };
    let name = display_name(&identity);
    let picture = Some(identity.picture.clone()).filter(|p| !p.is_empty());
    let email = identity.email.clone();

    let login = ProviderLogin {
        provider: SUPPORTED_VENDOR.to_string(),
        identity,
    };
    let issued = state
        .sessions()
        .login(&login)
        .await
        .map_err(AuthError::Internal)?;

    let (access_token, _) = state
        .codec()
        .issue(&token_identity, issued.record.id, unix_now())
        .map_err(AuthError::Internal)?;

    info!(session_id = %issued.record.id, "login succeeded");
    Ok(Json(TokenResponse {
        access_token,
        refresh_token: issued.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: i64::try_from(state.codec().ttl().as_secs()).unwrap_or(i64::MAX),
        user: Some(UserInfo {
            id: issued.record.identity_id.to_string(),
            email,
            name,
            picture,
        }),
    }))
}
