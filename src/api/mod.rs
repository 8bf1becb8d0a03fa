//! HTTP surface: server wiring, admission middleware, and auth endpoints.

use crate::APP_USER_AGENT;
use crate::auth::rate_limit::SlidingWindowLimiter;
use crate::auth::state::{AuthConfig, AuthState};
use crate::storage::pg::PgStore;
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;

pub(crate) mod gate;
pub(crate) mod handlers;
mod openapi;

pub use gate::ANONYMOUS_ID_HEADER;
pub use openapi::openapi;

/// Start the server.
///
/// `content` holds the content-generation routes this service only gates;
/// every route in it whose path names a metered endpoint passes through the
/// admission middleware. The auth and health routes are added here.
///
/// # Errors
/// Returns an error if the database or listener cannot be set up, or the
/// server fails while running.
pub async fn new(port: u16, dsn: String, config: AuthConfig, content: Router) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let limiter = SlidingWindowLimiter::new(config.rate_limit_window(), config.rate_limit_ceiling());
    let sweeper = limiter.spawn_sweeper(config.sweep_interval());

    let http = reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let auth_state = Arc::new(AuthState::new(
        config,
        store.clone(),
        store,
        http,
        Arc::new(limiter),
    )?);

    let cors = CorsLayer::new()
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(ANONYMOUS_ID_HEADER),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .expose_headers([HeaderName::from_static(ANONYMOUS_ID_HEADER)]);

    // Metering applies to the content routes only; the auth and health
    // routes below are added after the middleware and stay ungated.
    let app = content
        .layer(middleware::from_fn(gate::meter))
        .route("/api/auth/login", post(handlers::auth::login::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh::refresh))
        .route("/api/auth/logout", post(handlers::auth::logout::logout))
        .route("/api/auth/profile", get(handlers::auth::profile::profile))
        .route("/health", get(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
