//! Study session repository
//!
//! Database operations for `study_sessions`.
//!
//! Inserts and time-changing updates are *exclusive*: the write and the
//! overlap check against the owner's other sessions run in one transaction,
//! and the transaction is rolled back if a conflict is found. On SQLite the
//! write holds the database write lock for the rest of the transaction; on
//! MySQL the neighbour read uses `FOR UPDATE`.

use super::filter::{SessionFilter, SortOrder, Value};
use super::{parse_sqlite_time, sqlite_time};
use crate::config::DatabaseDriver;
use crate::db::{mysql_pool, sqlite_pool, DynDatabasePool};
use crate::models::{SessionStatus, StudySession};
use crate::services::scheduling::{find_conflict, Interval};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{MySql, MySqlExecutor, MySqlPool, Row, Sqlite, SqliteExecutor, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Result of an exclusive write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The session was stored
    Written(StudySession),
    /// Nothing was stored; this existing session overlaps the candidate
    Conflict(StudySession),
    /// Update target does not exist or belongs to another owner
    NotFound,
}

/// Study session repository trait
#[async_trait]
pub trait StudySessionRepository: Send + Sync {
    /// Insert a new session unless it overlaps another session of the same owner
    async fn insert_exclusive(&self, session: &StudySession) -> Result<WriteOutcome>;

    /// Replace title, description and times of the session with
    /// `session.id` owned by `session.owner_id`, unless the new interval
    /// overlaps one of the owner's other sessions
    async fn update_exclusive(&self, session: &StudySession) -> Result<WriteOutcome>;

    /// All sessions matching `filter`, ordered by `sort`, at most `limit`
    async fn find(
        &self,
        filter: &SessionFilter,
        sort: SortOrder,
        limit: Option<i64>,
    ) -> Result<Vec<StudySession>>;

    /// First session matching `filter` in start order
    async fn find_one(&self, filter: &SessionFilter) -> Result<Option<StudySession>>;

    /// Set the notification flag and timestamp on every match; returns rows affected
    async fn mark_notified(&self, filter: &SessionFilter, at: DateTime<Utc>) -> Result<u64>;

    /// Delete the session if `owner_id` owns it; returns whether a row was removed
    async fn delete(&self, id: &str, owner_id: i64) -> Result<bool>;

    /// Total number of stored sessions
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based study session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxStudySessionRepository {
    pool: DynDatabasePool,
}

impl SqlxStudySessionRepository {
    /// Create a new SQLx study session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn StudySessionRepository> {
        Arc::new(Self::new(pool))
    }
}

const COLUMNS: &str = "id, owner_id, title, description, start_time, end_time, status, \
    notification_sent, notification_sent_at, created_at, updated_at";

const INSERT_SQL: &str = r#"
    INSERT INTO study_sessions (id, owner_id, title, description, start_time, end_time,
                                status, notification_sent, notification_sent_at,
                                created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_SQL: &str = r#"
    UPDATE study_sessions
    SET title = ?, description = ?, start_time = ?, end_time = ?, updated_at = ?
    WHERE id = ? AND owner_id = ?
"#;

fn select_sql(filter: &SessionFilter, sort: SortOrder, limit: Option<i64>) -> (String, Vec<&Value>) {
    let (where_clause, params) = filter.to_sql();
    let mut sql = format!(
        "SELECT {} FROM study_sessions WHERE {} ORDER BY {}",
        COLUMNS,
        where_clause,
        sort.sql()
    );
    if limit.is_some() {
        sql.push_str(" LIMIT ?");
    }
    (sql, params)
}

fn mark_notified_sql(filter: &SessionFilter) -> (String, Vec<&Value>) {
    let (where_clause, params) = filter.to_sql();
    let sql = format!(
        "UPDATE study_sessions SET notification_sent = ?, notification_sent_at = ?, \
         updated_at = ? WHERE {}",
        where_clause
    );
    (sql, params)
}

#[async_trait]
impl StudySessionRepository for SqlxStudySessionRepository {
    async fn insert_exclusive(&self, session: &StudySession) -> Result<WriteOutcome> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => insert_exclusive_sqlite(sqlite_pool(&self.pool)?, session).await,
            DatabaseDriver::Mysql => insert_exclusive_mysql(mysql_pool(&self.pool)?, session).await,
        }
    }

    async fn update_exclusive(&self, session: &StudySession) -> Result<WriteOutcome> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_exclusive_sqlite(sqlite_pool(&self.pool)?, session).await,
            DatabaseDriver::Mysql => update_exclusive_mysql(mysql_pool(&self.pool)?, session).await,
        }
    }

    async fn find(
        &self,
        filter: &SessionFilter,
        sort: SortOrder,
        limit: Option<i64>,
    ) -> Result<Vec<StudySession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                select_sqlite(sqlite_pool(&self.pool)?, filter, sort, limit).await
            }
            DatabaseDriver::Mysql => {
                select_mysql(mysql_pool(&self.pool)?, filter, sort, limit, false).await
            }
        }
    }

    async fn find_one(&self, filter: &SessionFilter) -> Result<Option<StudySession>> {
        let mut found = self.find(filter, SortOrder::StartAsc, Some(1)).await?;
        Ok(found.pop())
    }

    async fn mark_notified(&self, filter: &SessionFilter, at: DateTime<Utc>) -> Result<u64> {
        let (sql, params) = mark_notified_sql(filter);
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let stamp = sqlite_time(&at);
                let query = sqlx::query(&sql).bind(true).bind(stamp.clone()).bind(stamp);
                params
                    .into_iter()
                    .fold(query, bind_sqlite)
                    .execute(sqlite_pool(&self.pool)?)
                    .await
                    .context("Failed to mark study sessions notified")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                let query = sqlx::query(&sql).bind(true).bind(at).bind(at);
                params
                    .into_iter()
                    .fold(query, bind_mysql)
                    .execute(mysql_pool(&self.pool)?)
                    .await
                    .context("Failed to mark study sessions notified")?
                    .rows_affected()
            }
        };
        Ok(affected)
    }

    async fn delete(&self, id: &str, owner_id: i64) -> Result<bool> {
        let sql = "DELETE FROM study_sessions WHERE id = ? AND owner_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .bind(owner_id)
                .execute(sqlite_pool(&self.pool)?)
                .await
                .context("Failed to delete study session")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .bind(owner_id)
                .execute(mysql_pool(&self.pool)?)
                .await
                .context("Failed to delete study session")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM study_sessions";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(sqlite_pool(&self.pool)?)
                .await
                .context("Failed to count study sessions")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(mysql_pool(&self.pool)?)
                .await
                .context("Failed to count study sessions")?
                .get("count"),
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

fn bind_sqlite<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Text(s) => query.bind(s.clone()),
        Value::Int(i) => query.bind(*i),
        Value::Bool(b) => query.bind(*b),
        Value::Time(t) => query.bind(sqlite_time(t)),
    }
}

async fn select_sqlite<'e, E>(
    executor: E,
    filter: &SessionFilter,
    sort: SortOrder,
    limit: Option<i64>,
) -> Result<Vec<StudySession>>
where
    E: SqliteExecutor<'e>,
{
    let (sql, params) = select_sql(filter, sort, limit);
    let mut query = params.into_iter().fold(sqlx::query(&sql), bind_sqlite);
    if let Some(limit) = limit {
        query = query.bind(limit);
    }

    let rows = query
        .fetch_all(executor)
        .await
        .context("Failed to query study sessions")?;

    rows.iter().map(row_to_study_session_sqlite).collect()
}

async fn insert_exclusive_sqlite(pool: &SqlitePool, session: &StudySession) -> Result<WriteOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(INSERT_SQL)
        .bind(&session.id)
        .bind(session.owner_id)
        .bind(&session.title)
        .bind(&session.description)
        .bind(sqlite_time(&session.start_time))
        .bind(sqlite_time(&session.end_time))
        .bind(session.status.as_str())
        .bind(session.notification_sent)
        .bind(session.notification_sent_at.as_ref().map(sqlite_time))
        .bind(sqlite_time(&session.created_at))
        .bind(sqlite_time(&session.updated_at))
        .execute(&mut *tx)
        .await
        .context("Failed to insert study session")?;

    let neighbours = select_sqlite(
        &mut *tx,
        &SessionFilter::neighbours_of(session),
        SortOrder::StartAsc,
        None,
    )
    .await?;

    if let Some(existing) = find_conflict(&neighbours, &Interval::of(session)) {
        let existing = existing.clone();
        tx.rollback().await.context("Failed to roll back insert")?;
        return Ok(WriteOutcome::Conflict(existing));
    }

    tx.commit().await.context("Failed to commit insert")?;
    Ok(WriteOutcome::Written(session.clone()))
}

async fn update_exclusive_sqlite(pool: &SqlitePool, session: &StudySession) -> Result<WriteOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let affected = sqlx::query(UPDATE_SQL)
        .bind(&session.title)
        .bind(&session.description)
        .bind(sqlite_time(&session.start_time))
        .bind(sqlite_time(&session.end_time))
        .bind(sqlite_time(&session.updated_at))
        .bind(&session.id)
        .bind(session.owner_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update study session")?
        .rows_affected();

    if affected == 0 {
        tx.rollback().await.context("Failed to roll back update")?;
        return Ok(WriteOutcome::NotFound);
    }

    let neighbours = select_sqlite(
        &mut *tx,
        &SessionFilter::neighbours_of(session),
        SortOrder::StartAsc,
        None,
    )
    .await?;

    if let Some(existing) = find_conflict(&neighbours, &Interval::of(session)) {
        let existing = existing.clone();
        tx.rollback().await.context("Failed to roll back update")?;
        return Ok(WriteOutcome::Conflict(existing));
    }

    // Re-read so flags the scanner may have set are reported accurately
    let stored = select_sqlite(
        &mut *tx,
        &SessionFilter::new().id(&session.id),
        SortOrder::StartAsc,
        Some(1),
    )
    .await?
    .pop()
    .context("Study session vanished during update")?;

    tx.commit().await.context("Failed to commit update")?;
    Ok(WriteOutcome::Written(stored))
}

fn row_to_study_session_sqlite(row: &SqliteRow) -> Result<StudySession> {
    let status: String = row.get("status");
    let start_time: String = row.get("start_time");
    let end_time: String = row.get("end_time");
    let notified_at: Option<String> = row.get("notification_sent_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(StudySession {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        description: row.get("description"),
        start_time: parse_sqlite_time(&start_time)?,
        end_time: parse_sqlite_time(&end_time)?,
        status: SessionStatus::from_str(&status)?,
        notification_sent: row.get("notification_sent"),
        notification_sent_at: notified_at.as_deref().map(parse_sqlite_time).transpose()?,
        created_at: parse_sqlite_time(&created_at)?,
        updated_at: parse_sqlite_time(&updated_at)?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

fn bind_mysql<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Text(s) => query.bind(s.clone()),
        Value::Int(i) => query.bind(*i),
        Value::Bool(b) => query.bind(*b),
        Value::Time(t) => query.bind(*t),
    }
}

async fn select_mysql<'e, E>(
    executor: E,
    filter: &SessionFilter,
    sort: SortOrder,
    limit: Option<i64>,
    for_update: bool,
) -> Result<Vec<StudySession>>
where
    E: MySqlExecutor<'e>,
{
    let (mut sql, params) = select_sql(filter, sort, limit);
    if for_update {
        sql.push_str(" FOR UPDATE");
    }
    let mut query = params.into_iter().fold(sqlx::query(&sql), bind_mysql);
    if let Some(limit) = limit {
        query = query.bind(limit);
    }

    let rows = query
        .fetch_all(executor)
        .await
        .context("Failed to query study sessions")?;

    rows.iter().map(row_to_study_session_mysql).collect()
}

async fn insert_exclusive_mysql(pool: &MySqlPool, session: &StudySession) -> Result<WriteOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(INSERT_SQL)
        .bind(&session.id)
        .bind(session.owner_id)
        .bind(&session.title)
        .bind(&session.description)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.status.as_str())
        .bind(session.notification_sent)
        .bind(session.notification_sent_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert study session")?;

    let neighbours = select_mysql(
        &mut *tx,
        &SessionFilter::neighbours_of(session),
        SortOrder::StartAsc,
        None,
        true,
    )
    .await?;

    if let Some(existing) = find_conflict(&neighbours, &Interval::of(session)) {
        let existing = existing.clone();
        tx.rollback().await.context("Failed to roll back insert")?;
        return Ok(WriteOutcome::Conflict(existing));
    }

    tx.commit().await.context("Failed to commit insert")?;
    Ok(WriteOutcome::Written(session.clone()))
}

async fn update_exclusive_mysql(pool: &MySqlPool, session: &StudySession) -> Result<WriteOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // MySQL reports changed rows rather than matched rows, so check ownership first
    let owned = select_mysql(
        &mut *tx,
        &SessionFilter::new().id(&session.id).owner(session.owner_id),
        SortOrder::StartAsc,
        Some(1),
        true,
    )
    .await?;
    if owned.is_empty() {
        tx.rollback().await.context("Failed to roll back update")?;
        return Ok(WriteOutcome::NotFound);
    }

    sqlx::query(UPDATE_SQL)
        .bind(&session.title)
        .bind(&session.description)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.updated_at)
        .bind(&session.id)
        .bind(session.owner_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update study session")?;

    let neighbours = select_mysql(
        &mut *tx,
        &SessionFilter::neighbours_of(session),
        SortOrder::StartAsc,
        None,
        true,
    )
    .await?;

    if let Some(existing) = find_conflict(&neighbours, &Interval::of(session)) {
        let existing = existing.clone();
        tx.rollback().await.context("Failed to roll back update")?;
        return Ok(WriteOutcome::Conflict(existing));
    }

    let stored = select_mysql(
        &mut *tx,
        &SessionFilter::new().id(&session.id),
        SortOrder::StartAsc,
        Some(1),
        false,
    )
    .await?
    .pop()
    .context("Study session vanished during update")?;

    tx.commit().await.context("Failed to commit update")?;
    Ok(WriteOutcome::Written(stored))
}

fn row_to_study_session_mysql(row: &MySqlRow) -> Result<StudySession> {
    let status: String = row.get("status");

    Ok(StudySession {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        description: row.get("description"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        status: SessionStatus::from_str(&status)?,
        notification_sent: row.get("notification_sent"),
        notification_sent_at: row.get("notification_sent_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::config::{DatabaseConfig, DatabaseDriver};
    use crate::db::{create_pool, create_test_pool, migrations};
    use crate::models::User;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 4, hour, min, 0).unwrap()
    }

    async fn setup() -> (SqlxStudySessionRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let alice = users
            .create(&User::new("alice@example.com".into(), "h".into(), "a".into()))
            .await
            .unwrap();
        let bob = users
            .create(&User::new("bob@example.com".into(), "h".into(), "b".into()))
            .await
            .unwrap();
        (SqlxStudySessionRepository::new(pool), alice.id, bob.id)
    }

    fn session(owner: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> StudySession {
        StudySession::new(owner, "Calculus".into(), Some("ch. 3".into()), start, end, at(0, 0))
    }

    async fn insert(repo: &SqlxStudySessionRepository, s: &StudySession) -> WriteOutcome {
        repo.insert_exclusive(s).await.expect("insert failed")
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let (repo, alice, _) = setup().await;
        let s = session(alice, at(10, 0), at(11, 0));
        assert_eq!(insert(&repo, &s).await, WriteOutcome::Written(s.clone()));

        let found = repo
            .find_one(&SessionFilter::new().id(&s.id))
            .await
            .unwrap()
            .expect("missing");
        assert_eq!(found, s);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_insert_rolled_back() {
        let (repo, alice, _) = setup().await;
        let first = session(alice, at(10, 0), at(11, 0));
        insert(&repo, &first).await;

        let clash = session(alice, at(10, 30), at(10, 45));
        assert_eq!(insert(&repo, &clash).await, WriteOutcome::Conflict(first));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_adjacent_inserts_accepted() {
        let (repo, alice, _) = setup().await;
        insert(&repo, &session(alice, at(10, 0), at(11, 0))).await;

        let before = session(alice, at(9, 0), at(10, 0));
        let after = session(alice, at(11, 0), at(12, 0));
        assert!(matches!(insert(&repo, &before).await, WriteOutcome::Written(_)));
        assert!(matches!(insert(&repo, &after).await, WriteOutcome::Written(_)));
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_other_owner_does_not_conflict() {
        let (repo, alice, bob) = setup().await;
        insert(&repo, &session(alice, at(10, 0), at(11, 0))).await;
        let bobs = session(bob, at(10, 0), at(11, 0));
        assert!(matches!(insert(&repo, &bobs).await, WriteOutcome::Written(_)));
    }

    #[tokio::test]
    async fn test_update_with_same_times_does_not_self_conflict() {
        let (repo, alice, _) = setup().await;
        let mut s = session(alice, at(10, 0), at(11, 0));
        insert(&repo, &s).await;

        s.title = "Calculus II".into();
        match repo.update_exclusive(&s).await.unwrap() {
            WriteOutcome::Written(stored) => assert_eq!(stored.title, "Calculus II"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_into_neighbour_rolled_back() {
        let (repo, alice, _) = setup().await;
        let a = session(alice, at(10, 0), at(11, 0));
        let mut b = session(alice, at(12, 0), at(13, 0));
        insert(&repo, &a).await;
        insert(&repo, &b).await;

        b.start_time = at(10, 59);
        assert_eq!(
            repo.update_exclusive(&b).await.unwrap(),
            WriteOutcome::Conflict(a)
        );

        let stored = repo.find_one(&SessionFilter::new().id(&b.id)).await.unwrap().unwrap();
        assert_eq!(stored.start_time, at(12, 0));
    }

    #[tokio::test]
    async fn test_update_by_other_owner_not_found() {
        let (repo, alice, bob) = setup().await;
        let mut s = session(alice, at(10, 0), at(11, 0));
        insert(&repo, &s).await;

        s.owner_id = bob;
        s.title = "hijack".into();
        assert_eq!(repo.update_exclusive(&s).await.unwrap(), WriteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_find_sorts_and_limits() {
        let (repo, alice, _) = setup().await;
        for hour in [14, 9, 11] {
            insert(&repo, &session(alice, at(hour, 0), at(hour, 30))).await;
        }

        let asc = repo
            .find(&SessionFilter::new().owner(alice), SortOrder::StartAsc, None)
            .await
            .unwrap();
        let hours: Vec<_> = asc.iter().map(|s| s.start_time).collect();
        assert_eq!(hours, vec![at(9, 0), at(11, 0), at(14, 0)]);

        let desc = repo
            .find(&SessionFilter::new().owner(alice), SortOrder::StartDesc, Some(2))
            .await
            .unwrap();
        assert_eq!(desc.len(), 2);
        assert_eq!(desc[0].start_time, at(14, 0));
    }

    #[tokio::test]
    async fn test_time_range_filter() {
        let (repo, alice, _) = setup().await;
        insert(&repo, &session(alice, at(10, 0), at(10, 30))).await;
        insert(&repo, &session(alice, at(10, 30), at(11, 0))).await;
        insert(&repo, &session(alice, at(11, 0), at(11, 30))).await;

        let found = repo
            .find(
                &SessionFilter::new().start_gte(at(10, 30)).start_lte(at(11, 0)),
                SortOrder::StartAsc,
                None,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_mark_notified_by_membership() {
        let (repo, alice, _) = setup().await;
        let a = session(alice, at(10, 0), at(10, 30));
        let b = session(alice, at(11, 0), at(11, 30));
        let c = session(alice, at(12, 0), at(12, 30));
        for s in [&a, &b, &c] {
            insert(&repo, s).await;
        }

        let when = at(9, 50) + Duration::milliseconds(250);
        let updated = repo
            .mark_notified(&SessionFilter::new().id_in([a.id.clone(), c.id.clone()]), when)
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let pending = repo
            .find(&SessionFilter::new().notification_sent_ne(true), SortOrder::StartAsc, None)
            .await
            .unwrap();
        assert_eq!(pending.iter().map(|s| &s.id).collect::<Vec<_>>(), vec![&b.id]);

        let flagged = repo.find_one(&SessionFilter::new().id(&a.id)).await.unwrap().unwrap();
        assert!(flagged.notification_sent);
        assert_eq!(flagged.notification_sent_at, Some(when));
    }

    #[tokio::test]
    async fn test_update_keeps_notification_flag() {
        let (repo, alice, _) = setup().await;
        let mut s = session(alice, at(10, 0), at(11, 0));
        insert(&repo, &s).await;
        repo.mark_notified(&SessionFilter::new().id(&s.id), at(9, 50))
            .await
            .unwrap();

        s.start_time = at(15, 0);
        s.end_time = at(16, 0);
        match repo.update_exclusive(&s).await.unwrap() {
            WriteOutcome::Written(stored) => assert!(stored.notification_sent),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_is_owner_scoped() {
        let (repo, alice, bob) = setup().await;
        let s = session(alice, at(10, 0), at(11, 0));
        insert(&repo, &s).await;

        assert!(!repo.delete(&s.id, bob).await.unwrap());
        assert!(repo.delete(&s.id, alice).await.unwrap());
        assert!(!repo.delete(&s.id, alice).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    /// File-backed pool, so writers run on separate connections
    async fn shared_setup() -> (tempfile::TempDir, Arc<SqlxStudySessionRepository>, i64) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: dir.path().join("qh.db").to_string_lossy().to_string(),
        };
        let pool = create_pool(&config).await.expect("Failed to create pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let alice = SqlxUserRepository::new(pool.clone())
            .create(&User::new("alice@example.com".into(), "h".into(), "a".into()))
            .await
            .unwrap();
        (dir, Arc::new(SqlxStudySessionRepository::new(pool)), alice.id)
    }

    fn tally(outcomes: Vec<WriteOutcome>) -> (usize, usize) {
        let written = outcomes
            .iter()
            .filter(|o| matches!(o, WriteOutcome::Written(_)))
            .count();
        let conflicts = outcomes
            .iter()
            .filter(|o| matches!(o, WriteOutcome::Conflict(_)))
            .count();
        (written, conflicts)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overlapping_inserts_admit_one() {
        let (_dir, repo, alice) = shared_setup().await;
        const WRITERS: u32 = 8;

        for round in 0..5u32 {
            let hour = 8 + 2 * round;
            let handles: Vec<_> = (0..WRITERS)
                .map(|i| {
                    let repo = repo.clone();
                    let s = session(alice, at(hour, i), at(hour + 1, 30));
                    tokio::spawn(async move { repo.insert_exclusive(&s).await })
                })
                .collect();

            let mut outcomes = Vec::new();
            for handle in handles {
                outcomes.push(handle.await.unwrap().expect("insert failed"));
            }
            assert_eq!(tally(outcomes), (1, WRITERS as usize - 1), "round {}", round);
        }
        assert_eq!(repo.count().await.unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_into_same_slot_admit_one() {
        let (_dir, repo, alice) = shared_setup().await;

        let mut sessions = Vec::new();
        for i in 0..4u32 {
            let s = session(alice, at(1, 10 * i), at(1, 10 * i + 5));
            assert!(matches!(insert(&repo, &s).await, WriteOutcome::Written(_)));
            sessions.push(s);
        }

        let handles: Vec<_> = sessions
            .into_iter()
            .map(|mut s| {
                let repo = repo.clone();
                s.start_time = at(22, 0);
                s.end_time = at(23, 0);
                tokio::spawn(async move { repo.update_exclusive(&s).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().expect("update failed"));
        }
        assert_eq!(tally(outcomes), (1, 3));

        let moved = repo
            .find(
                &SessionFilter::new().owner(alice).start_gte(at(22, 0)),
                SortOrder::StartAsc,
                None,
            )
            .await
            .unwrap();
        assert_eq!(moved.len(), 1);
    }
}
