//! In-memory study session store for tests
//!
//! Evaluates exactly the [`SessionFilter`] vocabulary against a `Vec`, so
//! service tests can run without a database and can inject store failures.

use super::filter::{SessionFilter, SortOrder};
use super::study_session::{StudySessionRepository, WriteOutcome};
use crate::models::StudySession;
use crate::services::scheduling::{find_conflict, Interval};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryStudySessionRepository {
    rows: Mutex<Vec<StudySession>>,
    fail_mark_notified: AtomicBool,
}

impl InMemoryStudySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows directly, bypassing the overlap check
    pub async fn seed(&self, sessions: impl IntoIterator<Item = StudySession>) {
        self.rows.lock().await.extend(sessions);
    }

    pub async fn all(&self) -> Vec<StudySession> {
        self.rows.lock().await.clone()
    }

    /// Make every later `mark_notified` call fail
    pub fn fail_mark_notified(&self) {
        self.fail_mark_notified.store(true, Ordering::SeqCst);
    }
}

fn neighbours(rows: &[StudySession], session: &StudySession) -> Vec<StudySession> {
    let filter = SessionFilter::neighbours_of(session);
    rows.iter().filter(|s| filter.matches(s)).cloned().collect()
}

#[async_trait]
impl StudySessionRepository for InMemoryStudySessionRepository {
    async fn insert_exclusive(&self, session: &StudySession) -> Result<WriteOutcome> {
        let mut rows = self.rows.lock().await;
        let candidates = neighbours(&rows, session);
        if let Some(existing) = find_conflict(&candidates, &Interval::of(session)) {
            return Ok(WriteOutcome::Conflict(existing.clone()));
        }
        rows.push(session.clone());
        Ok(WriteOutcome::Written(session.clone()))
    }

    async fn update_exclusive(&self, session: &StudySession) -> Result<WriteOutcome> {
        let mut rows = self.rows.lock().await;
        let Some(idx) = rows
            .iter()
            .position(|s| s.id == session.id && s.owner_id == session.owner_id)
        else {
            return Ok(WriteOutcome::NotFound);
        };

        let candidates = neighbours(&rows, session);
        if let Some(existing) = find_conflict(&candidates, &Interval::of(session)) {
            return Ok(WriteOutcome::Conflict(existing.clone()));
        }

        let stored = &mut rows[idx];
        stored.title = session.title.clone();
        stored.description = session.description.clone();
        stored.start_time = session.start_time;
        stored.end_time = session.end_time;
        stored.updated_at = session.updated_at;
        Ok(WriteOutcome::Written(stored.clone()))
    }

    async fn find(
        &self,
        filter: &SessionFilter,
        sort: SortOrder,
        limit: Option<i64>,
    ) -> Result<Vec<StudySession>> {
        let rows = self.rows.lock().await;
        let mut found: Vec<StudySession> =
            rows.iter().filter(|s| filter.matches(s)).cloned().collect();
        found.sort_by(|a, b| (a.start_time, &a.id).cmp(&(b.start_time, &b.id)));
        if sort == SortOrder::StartDesc {
            found.reverse();
        }
        if let Some(limit) = limit {
            found.truncate(limit.max(0) as usize);
        }
        Ok(found)
    }

    async fn find_one(&self, filter: &SessionFilter) -> Result<Option<StudySession>> {
        Ok(self.find(filter, SortOrder::StartAsc, Some(1)).await?.pop())
    }

    async fn mark_notified(&self, filter: &SessionFilter, at: DateTime<Utc>) -> Result<u64> {
        if self.fail_mark_notified.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        let mut rows = self.rows.lock().await;
        let mut updated = 0;
        for row in rows.iter_mut().filter(|s| filter.matches(s)) {
            row.notification_sent = true;
            row.notification_sent_at = Some(at);
            row.updated_at = at;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete(&self, id: &str, owner_id: i64) -> Result<bool> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|s| !(s.id == id && s.owner_id == owner_id));
        Ok(rows.len() < before)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.lock().await.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 4, hour, min, 0).unwrap()
    }

    fn session(owner: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> StudySession {
        StudySession::new(owner, "Essay".into(), None, start, end, at(0, 0))
    }

    #[tokio::test]
    async fn test_behaves_like_sql_store_on_conflicts() {
        let repo = InMemoryStudySessionRepository::new();
        let first = session(1, at(10, 0), at(11, 0));
        repo.insert_exclusive(&first).await.unwrap();

        let clash = session(1, at(10, 30), at(10, 45));
        assert_eq!(
            repo.insert_exclusive(&clash).await.unwrap(),
            WriteOutcome::Conflict(first)
        );
        let touching = session(1, at(11, 0), at(12, 0));
        assert!(matches!(
            repo.insert_exclusive(&touching).await.unwrap(),
            WriteOutcome::Written(_)
        ));
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let repo = InMemoryStudySessionRepository::new();
        repo.fail_mark_notified();
        assert!(repo.mark_notified(&SessionFilter::new(), at(1, 0)).await.is_err());
    }
}
