//! Shared API response types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{DisplayStatus, StudySession, User};
use crate::services::Identity;

/// A study session as clients see it.
///
/// `status` is derived from the clock at response time; the persisted
/// lifecycle state is not exposed.
#[derive(Debug, Serialize)]
pub struct StudySessionResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: DisplayStatus,
    pub notification_sent: bool,
    pub notification_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudySessionResponse {
    pub fn at(session: StudySession, now: DateTime<Utc>) -> Self {
        Self {
            status: session.display_status(now),
            duration_minutes: session.duration_minutes(),
            id: session.id,
            title: session.title,
            description: session.description,
            start_time: session.start_time,
            end_time: session.end_time,
            notification_sent: session.notification_sent,
            notification_sent_at: session.notification_sent_at,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<StudySessionResponse>,
}

/// Single session, with `success` on writes
#[derive(Debug, Serialize)]
pub struct SessionEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub session: StudySessionResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Account info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub email_confirmed: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name().to_string(),
            email_confirmed: user.is_confirmed(),
        }
    }
}

impl From<&Identity> for UserResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.user_id,
            email: identity.email.clone(),
            display_name: identity.display_name().to_string(),
            email_confirmed: identity.confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_is_derived_from_clock() {
        let start = Utc.with_ymd_and_hms(2030, 3, 4, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2030, 3, 4, 11, 0, 0).unwrap();
        let session = StudySession::new(1, "Essay".into(), None, start, end, start);

        let during = StudySessionResponse::at(session.clone(), start + chrono::Duration::minutes(5));
        assert_eq!(during.status, DisplayStatus::Active);
        assert_eq!(during.duration_minutes, 60);

        let json = serde_json::to_value(StudySessionResponse::at(session, end)).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json.get("owner_id").is_none());
    }
}
