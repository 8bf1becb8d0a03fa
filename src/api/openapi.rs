//! OpenAPI document for the auth and health surface.

use utoipa::OpenApi;

use super::handlers::auth::types::{
    ErrorBody, LoginRequest, LogoutRequest, RefreshRequest, TokenResponse, UserInfo,
};
use super::handlers::health::Health;

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::auth::login::login,
        super::handlers::auth::refresh::refresh,
        super::handlers::auth::logout::logout,
        super::handlers::auth::profile::profile,
        super::handlers::health::health,
    ),
    components(schemas(
        LoginRequest,
        TokenResponse,
        RefreshRequest,
        LogoutRequest,
        UserInfo,
        ErrorBody,
        Health
    )),
    tags(
        (name = "auth", description = "Login, token refresh, and logout"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

/// The generated API document.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
