//! API layer - HTTP handlers and routing
//!
//! Everything lives under `/api/v1`:
//! - Health check
//! - Account endpoints (signup, confirmation link, login/logout, current user)
//! - Study session booking endpoints (authenticated)
//! - Reminder trigger endpoints (shared cron secret)

pub mod auth;
pub mod cron;
pub mod health;
pub mod middleware;
pub mod responses;
pub mod sessions;


use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Routes that need a logged-in user
    let protected_routes = Router::new()
        .merge(auth::protected_router())
        .merge(sessions::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Routes for the external scheduler
    let cron_routes = cron::router().route_layer(axum_middleware::from_fn_with_state(
        state,
        middleware::require_cron_secret,
    ));

    Router::new()
        .merge(health::router())
        .merge(auth::public_router())
        .merge(cron_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;

    // Cookie auth needs credentials allowed for the configured origin
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
