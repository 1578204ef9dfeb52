//! Study session model
//!
//! A study session is a user-owned, time-boxed block `[start_time, end_time)`
//! with a title, an optional description and a one-shot reminder flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum title length in characters
pub const TITLE_MAX_CHARS: usize = 100;
/// Maximum description length in characters
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// A persisted study session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    /// UUID v4, assigned at creation and never reused
    pub id: String,
    /// User who booked the session
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Stored lifecycle state; always `Scheduled` at creation
    pub status: SessionStatus,
    /// Set once a reminder dispatch has been attempted; never reverts
    pub notification_sent: bool,
    pub notification_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudySession {
    /// Build a fresh, unnotified session with a new identifier.
    pub fn new(
        owner_id: i64,
        title: String,
        description: Option<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            title,
            description,
            start_time,
            end_time,
            status: SessionStatus::Scheduled,
            notification_sent: false,
            notification_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status derived from the clock rather than the stored field.
    pub fn display_status(&self, now: DateTime<Utc>) -> DisplayStatus {
        if now < self.start_time {
            DisplayStatus::Scheduled
        } else if now < self.end_time {
            DisplayStatus::Active
        } else {
            DisplayStatus::Completed
        }
    }

    /// Session length in whole minutes
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

/// Persisted lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid session status: {}", s)),
        }
    }
}

/// Status shown to clients, computed from the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Scheduled,
    Active,
    Completed,
}

/// Input for booking a session.
///
/// Fields are optional so that a missing value surfaces as a validation
/// error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateStudySessionInput {
    pub title: Option<String>,
    pub description: Option<String>,
    /// RFC 3339 timestamp
    pub start_time: Option<String>,
    /// RFC 3339 timestamp
    pub end_time: Option<String>,
}

/// Input for editing a session. The edit replaces title, description and
/// times, so the same fields are required as on creation.
pub type UpdateStudySessionInput = CreateStudySessionInput;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, hour, min, 0).unwrap()
    }

    fn sample() -> StudySession {
        StudySession::new(1, "Algebra".into(), None, at(10, 0), at(11, 30), at(9, 0))
    }

    #[test]
    fn test_new_session_defaults() {
        let session = sample();
        assert_eq!(session.status, SessionStatus::Scheduled);
        assert!(!session.notification_sent);
        assert!(session.notification_sent_at.is_none());
        assert!(uuid::Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(sample().id, sample().id);
    }

    #[test]
    fn test_display_status_follows_clock() {
        let session = sample();
        assert_eq!(session.display_status(at(9, 59)), DisplayStatus::Scheduled);
        assert_eq!(session.display_status(at(10, 0)), DisplayStatus::Active);
        assert_eq!(
            session.display_status(at(11, 30) - Duration::seconds(1)),
            DisplayStatus::Active
        );
        assert_eq!(session.display_status(at(11, 30)), DisplayStatus::Completed);
    }

    #[test]
    fn test_duration_minutes() {
        assert_eq!(sample().duration_minutes(), 90);
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            SessionStatus::Scheduled,
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("paused".parse::<SessionStatus>().is_err());
    }
}
