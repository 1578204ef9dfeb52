//! Interval conflict checking
//!
//! Sessions occupy half-open intervals `[start, end)`. Two intervals
//! `[s1, e1)` and `[s2, e2)` overlap iff `s1 < e2 && s2 < e1`, so a session
//! ending at 10:00 and one starting at 10:00 do not conflict.

use chrono::{DateTime, Utc};

use crate::models::StudySession;

/// A non-empty half-open time interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Returns `None` unless `start < end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn of(session: &StudySession) -> Self {
        Self {
            start: session.start_time,
            end: session.end_time,
        }
    }
}

pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.start < b.end && b.start < a.end
}

/// First session in `existing` whose interval overlaps `candidate`.
///
/// `existing` must already be scoped to one owner with the candidate itself
/// removed. Status is not consulted: cancelled sessions still block.
pub fn find_conflict<'a>(
    existing: &'a [StudySession],
    candidate: &Interval,
) -> Option<&'a StudySession> {
    existing
        .iter()
        .find(|session| overlaps(&Interval::of(session), candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionStatus;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, hour, min, 0).unwrap()
    }

    fn interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Interval {
        Interval::new(start, end).unwrap()
    }

    fn booked(start: DateTime<Utc>, end: DateTime<Utc>) -> StudySession {
        StudySession::new(1, "Booked".into(), None, start, end, at(0, 0))
    }

    #[test]
    fn test_empty_and_inverted_intervals_rejected() {
        assert!(Interval::new(at(10, 0), at(10, 0)).is_none());
        assert!(Interval::new(at(11, 0), at(10, 0)).is_none());
    }

    #[test]
    fn test_contained_interval_conflicts() {
        let existing = vec![booked(at(10, 0), at(11, 0))];
        let hit = find_conflict(&existing, &interval(at(10, 30), at(10, 45)));
        assert_eq!(hit.map(|s| s.id.as_str()), Some(existing[0].id.as_str()));
    }

    #[test]
    fn test_adjacent_intervals_do_not_conflict() {
        let existing = vec![booked(at(10, 0), at(11, 0))];
        assert!(find_conflict(&existing, &interval(at(9, 0), at(10, 0))).is_none());
        assert!(find_conflict(&existing, &interval(at(11, 0), at(12, 0))).is_none());
    }

    #[test]
    fn test_enclosing_interval_conflicts() {
        let existing = vec![booked(at(10, 0), at(11, 0))];
        assert!(find_conflict(&existing, &interval(at(9, 0), at(12, 0))).is_some());
    }

    #[test]
    fn test_cancelled_sessions_still_block() {
        let mut cancelled = booked(at(10, 0), at(11, 0));
        cancelled.status = SessionStatus::Cancelled;
        let existing = vec![cancelled];
        assert!(find_conflict(&existing, &interval(at(10, 15), at(10, 20))).is_some());
    }

    #[test]
    fn test_returns_first_conflict_in_order() {
        let existing = vec![
            booked(at(8, 0), at(9, 0)),
            booked(at(10, 0), at(11, 0)),
            booked(at(11, 0), at(12, 0)),
        ];
        let hit = find_conflict(&existing, &interval(at(10, 30), at(11, 30))).unwrap();
        assert_eq!(hit.id, existing[1].id);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Overlap is exactly `s1 < e2 && s2 < e1` for every pair of valid intervals
        #[test]
        fn property_overlap_matches_predicate(
            s1 in 0i64..10_000, len1 in 1i64..5_000,
            s2 in 0i64..10_000, len2 in 1i64..5_000,
        ) {
            let base = at(0, 0);
            let a = interval(base + Duration::seconds(s1), base + Duration::seconds(s1 + len1));
            let b = interval(base + Duration::seconds(s2), base + Duration::seconds(s2 + len2));

            let expected = s1 < s2 + len2 && s2 < s1 + len1;
            prop_assert_eq!(overlaps(&a, &b), expected);
            prop_assert_eq!(overlaps(&b, &a), expected);
        }

        /// An interval that ends exactly where another begins never overlaps it
        #[test]
        fn property_touching_never_overlaps(
            start in 0i64..10_000, len1 in 1i64..5_000, len2 in 1i64..5_000,
        ) {
            let base = at(0, 0);
            let mid = base + Duration::seconds(start + len1);
            let left = interval(base + Duration::seconds(start), mid);
            let right = interval(mid, mid + Duration::seconds(len2));
            prop_assert!(!overlaps(&left, &right));
        }

        /// Every valid interval overlaps itself
        #[test]
        fn property_self_overlap(start in 0i64..10_000, len in 1i64..5_000) {
            let base = at(0, 0);
            let a = interval(base + Duration::seconds(start), base + Duration::seconds(start + len));
            prop_assert!(overlaps(&a, &a));
        }
    }
}
