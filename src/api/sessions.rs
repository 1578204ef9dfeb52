//! Study session API endpoints
//!
//! - GET    /api/v1/sessions       - List the caller's sessions
//! - POST   /api/v1/sessions       - Book a session
//! - GET    /api/v1/sessions/{id}  - Get one session
//! - PUT    /api/v1/sessions/{id}  - Edit a session
//! - DELETE /api/v1/sessions/{id}  - Delete a session
//!
//! Every route requires authentication and only ever sees the caller's own
//! sessions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{
    MessageResponse, SessionEnvelope, SessionListResponse, StudySessionResponse,
};
use crate::models::{CreateStudySessionInput, UpdateStudySessionInput};
use crate::services::StudySessionError;

/// Build the study session router (mounted behind `require_auth`)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route(
            "/sessions/{id}",
            get(get_session).put(update_session).delete(delete_session),
        )
}

fn map_error(error: StudySessionError) -> ApiError {
    match error {
        StudySessionError::Validation(msg) => ApiError::validation_error(msg),
        StudySessionError::InvalidId => ApiError::validation_error(error.to_string()),
        StudySessionError::Conflict => ApiError::conflict(error.to_string()),
        StudySessionError::NotFound => ApiError::not_found(error.to_string()),
        StudySessionError::Internal(e) => {
            ApiError::internal_error("Study session operation failed", format!("{:#}", e))
        }
    }
}

/// GET /api/v1/sessions
async fn list_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<SessionListResponse>, ApiError> {
    let now = Utc::now();
    let sessions = state
        .study_sessions
        .list(user.0.user_id)
        .await
        .map_err(map_error)?;

    Ok(Json(SessionListResponse {
        sessions: sessions
            .into_iter()
            .map(|s| StudySessionResponse::at(s, now))
            .collect(),
    }))
}

/// POST /api/v1/sessions
async fn create_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateStudySessionInput>,
) -> Result<(StatusCode, Json<SessionEnvelope>), ApiError> {
    let session = state
        .study_sessions
        .create(user.0.user_id, body)
        .await
        .map_err(map_error)?;

    Ok((
        StatusCode::CREATED,
        Json(SessionEnvelope {
            success: Some(true),
            session: StudySessionResponse::at(session, Utc::now()),
        }),
    ))
}

/// GET /api/v1/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    let session = state
        .study_sessions
        .get(user.0.user_id, &id)
        .await
        .map_err(map_error)?;

    Ok(Json(SessionEnvelope {
        success: None,
        session: StudySessionResponse::at(session, Utc::now()),
    }))
}

/// PUT /api/v1/sessions/{id}
async fn update_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateStudySessionInput>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    let session = state
        .study_sessions
        .update(user.0.user_id, &id, body)
        .await
        .map_err(map_error)?;

    Ok(Json(SessionEnvelope {
        success: Some(true),
        session: StudySessionResponse::at(session, Utc::now()),
    }))
}

/// DELETE /api/v1/sessions/{id}
async fn delete_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .study_sessions
        .delete(user.0.user_id, &id)
        .await
        .map_err(map_error)?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Study session deleted successfully".to_string(),
    }))
}
