//! Request/response types for auth endpoints, plus the wire mapping for
//! admission errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::error::AuthError;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    /// Identity vendor, matched case-insensitively; only `GOOGLE` is
    /// supported, anything else is a 404.
    pub vendor: String,
    /// Provider-signed ID token obtained by the client.
    pub id_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    /// Opaque refresh secret; shown exactly once, store it client-side.
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    /// Account summary; present on login, absent on refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    /// The current access token, possibly expired; identifies the session.
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct LogoutRequest {
    /// Invalidate every session of the identity, not just this device's.
    #[serde(default)]
    pub all_devices: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error_code: String,
    pub error_reason: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UnsupportedVendor(_) => StatusCode::NOT_FOUND,
            Self::LimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(err) => {
                // Details stay in the logs; the caller gets a generic body.
                error!("internal auth failure: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNAUTHORIZED,
        };
        let body = ErrorBody {
            error_code: self.code().to_string(),
            error_reason: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
