//! Admission middleware for metered content routes.
//!
//! Every request to a metered path goes through the gateway before reaching
//! its handler. Admitted requests carry an [`AuthContext`] extension
//! downstream; when a new anonymous id was minted, it is echoed back in the
//! `x-anonymous-id` response header for the caller to reuse.

use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::handlers::auth::bearer_token;
use crate::auth::endpoints::Endpoint;
use crate::auth::gateway::{AuthContext, RequestCredentials};
use crate::auth::state::AuthState;

/// Header carrying the caller's anonymous id, inbound and outbound.
pub const ANONYMOUS_ID_HEADER: &str = "x-anonymous-id";

/// Best-effort client address, preferring proxy-provided headers over the
/// socket peer.
fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn meter(
    Extension(state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    // Unmetered paths pass straight through; the gateway only sees endpoints
    // it knows.
    let Some(endpoint) = Endpoint::from_path(request.uri().path()) else {
        return next.run(request).await;
    };

    let headers = request.headers();
    let caller = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    let bearer = bearer_token(headers).map(ToString::to_string);
    let anonymous_id = headers
        .get(ANONYMOUS_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    let credentials = RequestCredentials {
        caller: &caller,
        bearer_token: bearer.as_deref(),
        anonymous_id: anonymous_id.as_deref(),
        endpoint,
    };
    match state.gateway().authorize(&credentials).await {
        Ok(context) => {
            let minted = match &context {
                AuthContext::Anonymous {
                    anonymous_id,
                    newly_created: true,
                } => Some(anonymous_id.clone()),
                _ => None,
            };
            request.extensions_mut().insert(context);
            let mut response = next.run(request).await;
            if let Some(id) = minted {
                if let Ok(value) = HeaderValue::from_str(&id) {
                    response.headers_mut().insert(ANONYMOUS_ID_HEADER, value);
                }
            }
            response
        }
        Err(err) => err.into_response(),
    }
}
