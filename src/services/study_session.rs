//! Study session service
//!
//! Booking rules for study sessions:
//! - title required, at most 100 characters after trimming
//! - description optional, at most 500 characters, blank stored as absent
//! - `start < end`, and no start in the past when creating
//! - no overlap with any other session of the same owner
//!
//! The overlap check and the write happen in one store transaction, see
//! [`StudySessionRepository::insert_exclusive`].

use crate::db::repositories::{
    stored_precision, SessionFilter, SortOrder, StudySessionRepository, WriteOutcome,
};
use crate::models::{
    CreateStudySessionInput, StudySession, UpdateStudySessionInput, DESCRIPTION_MAX_CHARS,
    TITLE_MAX_CHARS,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Error types for study session operations
#[derive(Debug, thiserror::Error)]
pub enum StudySessionError {
    #[error("{0}")]
    Validation(String),

    #[error("Time conflict with existing study session")]
    Conflict,

    /// Unknown id, or an id owned by someone else
    #[error("Study session not found")]
    NotFound,

    #[error("Invalid study session ID")]
    InvalidId,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StudySessionError {
    fn validation(message: &str) -> Self {
        Self::Validation(message.to_string())
    }
}

/// Fields that passed validation
#[derive(Debug)]
struct SessionFields {
    title: String,
    description: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

/// Parse an RFC 3339 input, truncated to stored precision
fn parse_time(value: &str) -> Result<DateTime<Utc>, StudySessionError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| stored_precision(t.with_timezone(&Utc)))
        .map_err(|_| StudySessionError::validation("Invalid date format"))
}

fn validate(input: &CreateStudySessionInput) -> Result<SessionFields, StudySessionError> {
    let title = input.title.as_deref().map(str::trim).unwrap_or_default();
    let (Some(start), Some(end)) = (input.start_time.as_deref(), input.end_time.as_deref()) else {
        return Err(StudySessionError::validation(
            "Title, start time, and end time are required",
        ));
    };
    if title.is_empty() || start.trim().is_empty() || end.trim().is_empty() {
        return Err(StudySessionError::validation(
            "Title, start time, and end time are required",
        ));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(StudySessionError::Validation(format!(
            "Title must be at most {} characters",
            TITLE_MAX_CHARS
        )));
    }

    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());
    if description.is_some_and(|d| d.chars().count() > DESCRIPTION_MAX_CHARS) {
        return Err(StudySessionError::Validation(format!(
            "Description must be at most {} characters",
            DESCRIPTION_MAX_CHARS
        )));
    }

    let start_time = parse_time(start)?;
    let end_time = parse_time(end)?;
    if start_time >= end_time {
        return Err(StudySessionError::validation(
            "End time must be after start time",
        ));
    }

    Ok(SessionFields {
        title: title.to_string(),
        description: description.map(str::to_string),
        start_time,
        end_time,
    })
}

fn check_id(id: &str) -> Result<(), StudySessionError> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| StudySessionError::InvalidId)
}

pub struct StudySessionService {
    repo: Arc<dyn StudySessionRepository>,
}

impl StudySessionService {
    pub fn new(repo: Arc<dyn StudySessionRepository>) -> Self {
        Self { repo }
    }

    /// Book a new session for `owner_id`
    pub async fn create(
        &self,
        owner_id: i64,
        input: CreateStudySessionInput,
    ) -> Result<StudySession, StudySessionError> {
        self.create_at(owner_id, input, Utc::now()).await
    }

    pub(crate) async fn create_at(
        &self,
        owner_id: i64,
        input: CreateStudySessionInput,
        now: DateTime<Utc>,
    ) -> Result<StudySession, StudySessionError> {
        let fields = validate(&input)?;
        let now = stored_precision(now);
        if fields.start_time < now {
            return Err(StudySessionError::validation(
                "Cannot schedule sessions in the past",
            ));
        }

        let session = StudySession::new(
            owner_id,
            fields.title,
            fields.description,
            fields.start_time,
            fields.end_time,
            now,
        );

        match self
            .repo
            .insert_exclusive(&session)
            .await
            .context("Failed to create study session")?
        {
            WriteOutcome::Written(created) => {
                tracing::debug!(session_id = %created.id, owner_id, "Study session created");
                Ok(created)
            }
            WriteOutcome::Conflict(existing) => {
                tracing::debug!(conflicts_with = %existing.id, owner_id, "Booking rejected");
                Err(StudySessionError::Conflict)
            }
            WriteOutcome::NotFound => Err(anyhow::anyhow!("Insert reported a missing row").into()),
        }
    }

    /// All sessions of `owner_id`, earliest first
    pub async fn list(&self, owner_id: i64) -> Result<Vec<StudySession>, StudySessionError> {
        let sessions = self
            .repo
            .find(&SessionFilter::new().owner(owner_id), SortOrder::StartAsc, None)
            .await
            .context("Failed to list study sessions")?;
        Ok(sessions)
    }

    pub async fn get(&self, owner_id: i64, id: &str) -> Result<StudySession, StudySessionError> {
        check_id(id)?;
        self.repo
            .find_one(&SessionFilter::new().id(id).owner(owner_id))
            .await
            .context("Failed to get study session")?
            .ok_or(StudySessionError::NotFound)
    }

    /// Replace title, description and times.
    ///
    /// The past-start rule is not applied, and the notification flag of the
    /// stored session is kept.
    pub async fn update(
        &self,
        owner_id: i64,
        id: &str,
        input: UpdateStudySessionInput,
    ) -> Result<StudySession, StudySessionError> {
        check_id(id)?;
        let fields = validate(&input)?;

        let mut session = self.get(owner_id, id).await?;
        session.title = fields.title;
        session.description = fields.description;
        session.start_time = fields.start_time;
        session.end_time = fields.end_time;
        session.updated_at = stored_precision(Utc::now());

        match self
            .repo
            .update_exclusive(&session)
            .await
            .context("Failed to update study session")?
        {
            WriteOutcome::Written(updated) => Ok(updated),
            WriteOutcome::Conflict(_) => Err(StudySessionError::Conflict),
            WriteOutcome::NotFound => Err(StudySessionError::NotFound),
        }
    }

    /// Number of stored sessions across all owners
    pub async fn count(&self) -> Result<i64, StudySessionError> {
        let count = self
            .repo
            .count()
            .await
            .context("Failed to count study sessions")?;
        Ok(count)
    }

    pub async fn delete(&self, owner_id: i64, id: &str) -> Result<(), StudySessionError> {
        check_id(id)?;
        let deleted = self
            .repo
            .delete(id, owner_id)
            .await
            .context("Failed to delete study session")?;
        if !deleted {
            return Err(StudySessionError::NotFound);
        }
        tracing::debug!(session_id = %id, owner_id, "Study session deleted");
        Ok(())
    }
}
