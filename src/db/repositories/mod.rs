//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for a single table.

pub mod auth_session;
pub mod filter;
#[cfg(test)]
pub mod memory;
pub mod study_session;
pub mod user;

pub use auth_session::{AuthSessionRepository, SqlxAuthSessionRepository};
pub use filter::{Condition, Field, SessionFilter, SortOrder, Value};
pub use study_session::{SqlxStudySessionRepository, StudySessionRepository, WriteOutcome};
pub use user::{SqlxUserRepository, UserRepository};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Truncate a timestamp to the microsecond precision both backends store
/// (`DATETIME(6)` on MySQL, [`sqlite_time`] on SQLite).
///
/// Times compared against stored rows must go through this first.
pub fn stored_precision(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(6)
}

/// Encode a timestamp for a SQLite TEXT column.
///
/// Fixed-width UTC with microseconds, so that string comparison in SQL is
/// chronological. Sub-microsecond digits are dropped.
pub(crate) fn sqlite_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a timestamp written by [`sqlite_time`]
pub(crate) fn parse_sqlite_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_sqlite_time_orders_lexicographically() {
        let base = Utc.with_ymd_and_hms(2026, 10, 16, 9, 59, 59).unwrap();
        let later = [
            base + Duration::microseconds(1),
            base + Duration::seconds(1),
            base + Duration::days(400),
        ];
        for t in later {
            assert!(sqlite_time(&base) < sqlite_time(&t));
        }
    }

    #[test]
    fn test_sqlite_time_parses_back() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap() + Duration::microseconds(42);
        assert_eq!(parse_sqlite_time(&sqlite_time(&t)).unwrap(), t);
        assert!(parse_sqlite_time("yesterday").is_err());
    }

    #[test]
    fn test_stored_precision_matches_sqlite_encoding() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap() + Duration::nanoseconds(123_456_789);
        let truncated = stored_precision(t);
        assert_eq!(truncated.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(parse_sqlite_time(&sqlite_time(&t)).unwrap(), truncated);
        assert_eq!(stored_precision(truncated), truncated);
    }
}
