//! Reminder trigger endpoints
//!
//! - POST /api/v1/cron/send-reminders - Run one reminder scan
//! - GET  /api/v1/cron/send-reminders - Read-only view of upcoming sessions
//!
//! Both require `Authorization: Bearer <cron.secret>`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::services::{ScanSummary, UpcomingReport};

/// Build the cron router (mounted behind `require_cron_secret`)
pub fn router() -> Router<AppState> {
    Router::new().route("/cron/send-reminders", get(status).post(send_reminders))
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub success: bool,
    pub message: String,
    pub stats: ScanSummary,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub report: UpcomingReport,
}

#[derive(Debug, Serialize)]
struct ScanFailure {
    success: bool,
    #[serde(flatten)]
    error: ApiError,
    timestamp: DateTime<Utc>,
}

/// POST /api/v1/cron/send-reminders
async fn send_reminders(State(state): State<AppState>) -> Response {
    let now = Utc::now();
    match state.scanner.run(now).await {
        Ok(stats) => {
            tracing::info!(
                found = stats.sessions_found,
                updated = stats.sessions_updated,
                "Reminder scan completed"
            );
            Json(ScanResponse {
                success: true,
                message: stats.message.clone(),
                stats,
                timestamp: now,
            })
            .into_response()
        }
        Err(e) => {
            let error = ApiError::internal_error("Reminder scan failed", &e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ScanFailure {
                    success: false,
                    error,
                    timestamp: now,
                }),
            )
                .into_response()
        }
    }
}

/// GET /api/v1/cron/send-reminders
async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let report = state
        .scanner
        .upcoming(Utc::now())
        .await
        .map_err(|e| ApiError::internal_error("Failed to inspect upcoming sessions", e))?;

    Ok(Json(StatusResponse {
        message: "Reminder status check",
        report,
    }))
}
