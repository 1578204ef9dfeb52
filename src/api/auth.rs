//! Authentication API endpoints
//!
//! - POST /api/v1/auth/signup  - Create an account
//! - GET  /api/v1/auth/confirm - Confirmation link target (redirects)
//! - POST /api/v1/auth/login   - Log in
//! - POST /api/v1/auth/logout  - Log out
//! - GET  /api/v1/auth/me      - Current identity

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{client_ip, ApiError, AppState, AuthenticatedUser, SessionToken};
use crate::api::responses::UserResponse;
use crate::models::SignupInput;
use crate::services::UserServiceError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub success: bool,
    pub needs_confirmation: bool,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub token: Option<String>,
    pub next: Option<String>,
}

/// Routes that need no login
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/confirm", get(confirm))
        .route("/auth/login", post(login))
}

/// Routes mounted behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

/// POST /api/v1/auth/signup
async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupInput>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .user_service
        .signup(body)
        .await
        .map_err(|e| match e {
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            other => ApiError::internal_error("Signup failed", other),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            success: true,
            needs_confirmation: outcome.needs_confirmation,
            user: UserResponse::from(&outcome.user),
        }),
    ))
}

/// Only internal paths are honoured as redirect targets
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}

fn error_redirect(message: &str) -> Redirect {
    Redirect::to(&format!("/error?message={}", urlencoding::encode(message)))
}

/// GET /api/v1/auth/confirm?token=…&next=/…
async fn confirm(State(state): State<AppState>, Query(query): Query<ConfirmQuery>) -> Redirect {
    let Some(token) = query.token.as_deref().filter(|t| !t.trim().is_empty()) else {
        return Redirect::to("/error");
    };

    match state.user_service.confirm_email(token).await {
        Ok(_) => Redirect::to(&format!(
            "/auth/confirm/success?next={}",
            urlencoding::encode(safe_next(query.next.as_deref()))
        )),
        Err(UserServiceError::InvalidToken) => {
            error_redirect(&UserServiceError::InvalidToken.to_string())
        }
        Err(e) => {
            tracing::error!("Email confirmation failed: {}", e);
            error_redirect("Confirmation failed")
        }
    }
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(ip) = client_ip(&headers) {
        if state.rate_limiter.is_ip_limited(ip).await {
            return Err(ApiError::rate_limited(
                "Too many requests, please try again later",
                60,
            ));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    if state.rate_limiter.is_email_limited(&body.email).await {
        return Err(ApiError::rate_limited(
            "Too many failed login attempts, please try again in 15 minutes",
            900,
        ));
    }

    let (user, session) = match state.user_service.login(&body.email, &body.password).await {
        Ok(ok) => ok,
        Err(UserServiceError::AuthenticationError(msg)) => {
            state.rate_limiter.record_failed_attempt(&body.email).await;
            return Err(ApiError::unauthorized(msg));
        }
        Err(UserServiceError::EmailNotConfirmed) => {
            return Err(ApiError::new(
                "EMAIL_NOT_CONFIRMED",
                "Please confirm your email address before logging in",
            ));
        }
        Err(e) => return Err(ApiError::internal_error("Login failed", e)),
    };

    state.rate_limiter.clear_email(&body.email).await;
    tracing::info!(user_id = user.id, "User logged in");

    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id,
        state.config.auth.session_days * 24 * 60 * 60
    );
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::internal_error("Invalid session cookie", e))?,
    );

    Ok((
        response_headers,
        Json(AuthResponse {
            user: UserResponse::from(&user),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<impl IntoResponse, ApiError> {
    state
        .user_service
        .logout(&token)
        .await
        .map_err(|e| ApiError::internal_error("Logout failed", e))?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me
async fn me(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(UserResponse::from(&user.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/dashboard")), "/dashboard");
        assert_eq!(safe_next(Some("//evil.example.com")), "/");
        assert_eq!(safe_next(Some("https://evil.example.com")), "/");
        assert_eq!(safe_next(None), "/");
    }
}
