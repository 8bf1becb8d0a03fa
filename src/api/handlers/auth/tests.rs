use axum::body::Body;
use axum::http::{Request, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE};
use axum::routing::post;
use axum::{Extension, Router};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

use super::{login, logout, profile, refresh};
use crate::auth::rate_limit::NoopRateLimiter;
use crate::auth::state::{AuthConfig, AuthState};
use crate::auth::verifier::VerifiedIdentity;
use crate::storage::ProviderLogin;
use crate::storage::memory::MemoryStore;

fn state() -> Arc<AuthState> {
    let store = Arc::new(MemoryStore::new());
    let config = AuthConfig::new(
        "client-id.apps.googleusercontent.com".to_string(),
        SecretString::from("handler-test-secret-handler-test-secret"),
    );
    Arc::new(
        AuthState::new(
            config,
            store.clone(),
            store,
            reqwest::Client::new(),
            Arc::new(NoopRateLimiter),
        )
        .expect("state builds"),
    )
}

fn router(state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/api/auth/login", post(login::login))
        .route("/api/auth/refresh", post(refresh::refresh))
        .route("/api/auth/logout", post(logout::logout))
        .route("/api/auth/profile", axum::routing::get(profile::profile))
        .layer(Extension(state))
}

/// Establish a session directly against the registry and mint a matching
/// access token, sidestepping credential verification.
async fn signed_in(state: &AuthState) -> (String, String) {
    let login = ProviderLogin {
        provider: "google".to_string(),
        identity: VerifiedIdentity {
            subject: "sub-1".to_string(),
            email: "alice@example.com".to_string(),
            email_verified: true,
            given_name: "Alice".to_string(),
            family_name: "Example".to_string(),
            picture: String::new(),
            issuer: "https://accounts.google.com".to_string(),
            issued_at: 0,
            expires_at: 0,
            key_id: "kid".to_string(),
            algorithm: "RS256".to_string(),
        },
    };
    let issued = state.sessions().login(&login).await.expect("login");
    let identity = crate::auth::access_token::TokenIdentity {
        subject: "sub-1".to_string(),
        email: "alice@example.com".to_string(),
        given_name: "Alice".to_string(),
        family_name: "Example".to_string(),
        email_verified: true,
    };
    let (access_token, _) = state
        .codec()
        .issue(
            &identity,
            issued.record.id,
            crate::auth::gateway::unix_now(),
        )
        .expect("token");
    (access_token, issued.refresh_token)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn login_rejects_unknown_vendor_as_not_found() {
    let app = router(state());
    let response = app
        .oneshot(post_json(
            "/api/auth/login",
            json!({"vendor": "facebook", "id_token": "whatever"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(
        body.get("error_code").and_then(Value::as_str),
        Some("UNSUPPORTED_VENDOR")
    );
}

#[tokio::test]
async fn login_accepts_vendor_enum_spelling() {
    // "GOOGLE" is a supported vendor and must get past vendor matching; a
    // bogus credential then fails verification, never vendor lookup.
    let app = router(state());
    let response = app
        .oneshot(post_json(
            "/api/auth/login",
            json!({"vendor": "GOOGLE", "id_token": "whatever"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(
        body.get("error_code").and_then(Value::as_str),
        Some("INVALID_CREDENTIAL")
    );
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() {
    let state = state();
    let (access_token, refresh_token) = signed_in(&state).await;

    let response = router(state.clone())
        .oneshot(post_json(
            "/api/auth/refresh",
            json!({"access_token": access_token, "refresh_token": refresh_token}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let new_refresh = body
        .get("refresh_token")
        .and_then(Value::as_str)
        .expect("refresh token");
    assert_ne!(new_refresh, refresh_token);
    assert_eq!(
        body.get("token_type").and_then(Value::as_str),
        Some("Bearer")
    );
    // The account summary is a login-only field.
    assert!(body.get("user").is_none());

    // The consumed secret no longer rotates.
    let response = router(state)
        .oneshot(post_json(
            "/api/auth/refresh",
            json!({"access_token": access_token, "refresh_token": refresh_token}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(
        body.get("error_code").and_then(Value::as_str),
        Some("INVALID_REFRESH_TOKEN")
    );
}

#[tokio::test]
async fn refresh_with_garbage_access_token_is_malformed() {
    let response = router(state())
        .oneshot(post_json(
            "/api/auth/refresh",
            json!({"access_token": "garbage", "refresh_token": "secret"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(
        body.get("error_code").and_then(Value::as_str),
        Some("TOKEN_MALFORMED")
    );
}

#[tokio::test]
async fn logout_invalidates_the_bearer_session() {
    let state = state();
    let (access_token, refresh_token) = signed_in(&state).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .header(AUTHORIZATION, format!("Bearer {access_token}"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .expect("request");
    let response = router(state.clone())
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Rotation still works per the registry contract; the session itself is
    // INVALID until then.
    let claims = state.codec().parse(&access_token, false).expect("claims");
    let session_id = uuid::Uuid::parse_str(&claims.sid).expect("sid");
    let session = state
        .sessions()
        .get(session_id)
        .await
        .expect("get")
        .expect("present");
    assert!(!session.valid);
    drop(refresh_token);
}

#[tokio::test]
async fn profile_returns_the_bound_account() {
    let state = state();
    let (access_token, _refresh_token) = signed_in(&state).await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/auth/profile")
        .header(AUTHORIZATION, format!("Bearer {access_token}"))
        .body(Body::empty())
        .expect("request");
    let response = router(state)
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(
        body.get("email").and_then(Value::as_str),
        Some("alice@example.com")
    );
    assert_eq!(
        body.get("name").and_then(Value::as_str),
        Some("Alice Example")
    );
    // The binding carries no picture, so the field is omitted entirely.
    assert!(body.get("picture").is_none());
}

#[tokio::test]
async fn profile_is_gone_after_logout() {
    let state = state();
    let (access_token, _refresh_token) = signed_in(&state).await;

    let claims = state.codec().parse(&access_token, false).expect("claims");
    let session_id = uuid::Uuid::parse_str(&claims.sid).expect("sid");
    state
        .sessions()
        .invalidate(session_id)
        .await
        .expect("invalidate");

    let request = Request::builder()
        .method("GET")
        .uri("/api/auth/profile")
        .header(AUTHORIZATION, format!("Bearer {access_token}"))
        .body(Body::empty())
        .expect("request");
    let response = router(state)
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(
        body.get("error_code").and_then(Value::as_str),
        Some("LOGIN_REQUIRED")
    );
}

#[tokio::test]
async fn profile_without_bearer_requires_login() {
    let request = Request::builder()
        .method("GET")
        .uri("/api/auth/profile")
        .body(Body::empty())
        .expect("request");
    let response = router(state())
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_without_bearer_requires_login() {
    let response = router(state())
        .oneshot(post_json("/api/auth/logout", json!({})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(
        body.get("error_code").and_then(Value::as_str),
        Some("LOGIN_REQUIRED")
    );
}
