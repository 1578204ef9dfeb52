//! Reminder window scanner
//!
//! A scan selects the scheduled, not yet notified sessions whose start lies
//! in the due window `[now + lead, now + lead + tolerance]` (both ends
//! closed), mails their owners in one batch, then flags every session that
//! was part of the batch, whether or not its own message was delivered.
//!
//! Sessions whose owner cannot be resolved are left unflagged so a later
//! scan inside the window can pick them up. A batch-level send failure
//! aborts the scan before anything is flagged. There is no backfill: a
//! session never observed inside its window is never reminded.

use crate::config::ReminderConfig;
use crate::db::repositories::{SessionFilter, SortOrder, StudySessionRepository};
use crate::models::{SessionStatus, StudySession};
use crate::services::identity::IdentityProvider;
use crate::services::notification::{NotificationSender, ReminderMessage, SendError};
use crate::services::templates::{format_duration, MailTemplates};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;

/// The closed interval of start times due for a reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReminderWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReminderWindow {
    pub fn at(now: DateTime<Utc>, lead_minutes: i64, tolerance_minutes: i64) -> Self {
        let start = now + Duration::minutes(lead_minutes);
        Self {
            start,
            end: start + Duration::minutes(tolerance_minutes),
        }
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time <= self.end
    }

    fn describe(&self) -> String {
        format!(
            "{} to {}",
            self.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// Outcome of one scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub message: String,
    pub sessions_found: usize,
    pub sessions_processed: usize,
    pub emails_attempted: usize,
    pub emails_successful: usize,
    pub emails_failed: usize,
    pub sessions_updated: u64,
    pub checked_window: String,
    pub window: ReminderWindow,
    pub timestamp: DateTime<Utc>,
}

impl ScanSummary {
    fn empty(message: &str, window: ReminderWindow, now: DateTime<Utc>) -> Self {
        Self {
            message: message.to_string(),
            sessions_found: 0,
            sessions_processed: 0,
            emails_attempted: 0,
            emails_successful: 0,
            emails_failed: 0,
            sessions_updated: 0,
            checked_window: window.describe(),
            window,
            timestamp: now,
        }
    }
}

/// One entry of the read-only upcoming inspection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingSession {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub notification_sent: bool,
    pub minutes_until_start: i64,
    pub owner_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingReport {
    pub current_time: DateTime<Utc>,
    /// Start of the due window at `current_time`
    pub reminders_due_from: DateTime<Utc>,
    pub upcoming_sessions: Vec<UpcomingSession>,
    pub total_upcoming: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error("Failed to query sessions: {0:#}")]
    Query(anyhow::Error),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("Failed to flag notified sessions: {0:#}")]
    Flag(anyhow::Error),
}

pub struct ReminderScanner {
    repo: Arc<dyn StudySessionRepository>,
    identity: Arc<dyn IdentityProvider>,
    sender: Arc<dyn NotificationSender>,
    templates: Arc<MailTemplates>,
    config: ReminderConfig,
}

impl ReminderScanner {
    pub fn new(
        repo: Arc<dyn StudySessionRepository>,
        identity: Arc<dyn IdentityProvider>,
        sender: Arc<dyn NotificationSender>,
        templates: Arc<MailTemplates>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            repo,
            identity,
            sender,
            templates,
            config,
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> ReminderWindow {
        ReminderWindow::at(now, self.config.lead_minutes, self.config.window_minutes)
    }

    /// Sessions due for a reminder at `now`, earliest first. Read-only.
    pub async fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<StudySession>, ReminderError> {
        let window = self.window(now);
        let filter = SessionFilter::new()
            .status_eq(SessionStatus::Scheduled)
            .notification_sent_ne(true)
            .start_gte(window.start)
            .start_lte(window.end);

        self.repo
            .find(&filter, SortOrder::StartAsc, None)
            .await
            .map_err(ReminderError::Query)
    }

    /// Run one scan at `now`
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ScanSummary, ReminderError> {
        let window = self.window(now);
        tracing::info!(window = %window.describe(), "Checking for sessions due a reminder");

        let due = self.select_due(now).await?;
        tracing::info!(found = due.len(), "Sessions due a reminder");
        if due.is_empty() {
            return Ok(ScanSummary::empty("No sessions to notify", window, now));
        }

        let mut batch = Vec::with_capacity(due.len());
        let mut batch_ids = Vec::with_capacity(due.len());
        for session in &due {
            match self.prepare(session).await {
                Ok(message) => match self.templates.reminder(&message, self.config.lead_minutes) {
                    Ok(mail) => {
                        batch.push(mail);
                        batch_ids.push(session.id.clone());
                    }
                    Err(e) => tracing::error!(
                        session_id = %session.id,
                        "Skipping session, reminder did not render: {:#}",
                        e
                    ),
                },
                Err(reason) => tracing::warn!(
                    session_id = %session.id,
                    owner_id = session.owner_id,
                    "Skipping session: {}",
                    reason
                ),
            }
        }

        if batch.is_empty() {
            return Ok(ScanSummary {
                sessions_found: due.len(),
                ..ScanSummary::empty("No valid sessions to notify (owners not resolved)", window, now)
            });
        }

        let results = self.sender.send_batch(&batch).await?;
        let successful = results.iter().filter(|r| r.success).count();
        for failed in results.iter().filter(|r| !r.success) {
            tracing::warn!(
                to = %failed.to,
                "Reminder not delivered: {}",
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }
        tracing::info!(
            attempted = results.len(),
            successful,
            failed = results.len() - successful,
            "Reminder batch sent"
        );

        let updated = self
            .repo
            .mark_notified(&SessionFilter::new().id_in(&batch_ids), now)
            .await
            .map_err(ReminderError::Flag)?;
        tracing::info!(updated, "Sessions flagged as notified");

        Ok(ScanSummary {
            message: "Reminder scan completed".to_string(),
            sessions_found: due.len(),
            sessions_processed: batch.len(),
            emails_attempted: results.len(),
            emails_successful: successful,
            emails_failed: results.len() - successful,
            sessions_updated: updated,
            checked_window: window.describe(),
            window,
            timestamp: now,
        })
    }

    /// Resolve the owner and build the payload; `Err` carries the skip reason
    async fn prepare(&self, session: &StudySession) -> Result<ReminderMessage, String> {
        let identity = self
            .identity
            .lookup(session.owner_id)
            .await
            .map_err(|e| e.to_string())?;
        if !identity.confirmed {
            return Err("owner has not confirmed their email".to_string());
        }

        Ok(ReminderMessage {
            session_id: session.id.clone(),
            display_name: identity.display_name().to_string(),
            email: identity.email,
            title: session.title.clone(),
            description: session.description.clone(),
            start_time: session.start_time,
            end_time: session.end_time,
            duration: format_duration(&session.start_time, &session.end_time),
        })
    }

    /// Scheduled sessions starting within the inspection horizon. Read-only.
    pub async fn upcoming(&self, now: DateTime<Utc>) -> Result<UpcomingReport, ReminderError> {
        let filter = SessionFilter::new()
            .status_eq(SessionStatus::Scheduled)
            .start_gte(now)
            .start_lte(now + Duration::minutes(self.config.upcoming_minutes));

        let sessions = self
            .repo
            .find(&filter, SortOrder::StartAsc, Some(self.config.upcoming_limit))
            .await
            .map_err(ReminderError::Query)?;

        let upcoming_sessions: Vec<UpcomingSession> = sessions
            .into_iter()
            .map(|s| UpcomingSession {
                minutes_until_start: minutes_until(now, s.start_time),
                id: s.id,
                title: s.title,
                start_time: s.start_time,
                notification_sent: s.notification_sent,
                owner_id: s.owner_id,
            })
            .collect();

        Ok(UpcomingReport {
            current_time: now,
            reminders_due_from: self.window(now).start,
            total_upcoming: upcoming_sessions.len(),
            upcoming_sessions,
        })
    }
}

/// Whole minutes from `now` to `start`, rounded to nearest
fn minutes_until(now: DateTime<Utc>, start: DateTime<Utc>) -> i64 {
    ((start - now).num_milliseconds() as f64 / 60_000.0).round() as i64
}
