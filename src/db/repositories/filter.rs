//! Query vocabulary for study sessions
//!
//! A [`SessionFilter`] is a conjunction of conditions drawn from a closed set:
//! equality, not-equal, less-than, less-or-equal, greater-or-equal and
//! set-membership. The SQL store renders it to a `WHERE` clause with bound
//! parameters; the test store evaluates it directly against rows.

use chrono::{DateTime, Utc};

use crate::models::{SessionStatus, StudySession};

/// Filterable columns of `study_sessions`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    OwnerId,
    Status,
    NotificationSent,
    StartTime,
    EndTime,
}

impl Field {
    pub fn column(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::OwnerId => "owner_id",
            Field::Status => "status",
            Field::NotificationSent => "notification_sent",
            Field::StartTime => "start_time",
            Field::EndTime => "end_time",
        }
    }

    /// Read this field from a session
    pub fn value_of(&self, session: &StudySession) -> Value {
        match self {
            Field::Id => Value::Text(session.id.clone()),
            Field::OwnerId => Value::Int(session.owner_id),
            Field::Status => Value::Text(session.status.as_str().to_string()),
            Field::NotificationSent => Value::Bool(session.notification_sent),
            Field::StartTime => Value::Time(session.start_time),
            Field::EndTime => Value::Time(session.end_time),
        }
    }
}

/// A bound parameter. Only values of the same variant are comparable.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
}

/// A single predicate on one field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Field, Value),
    Ne(Field, Value),
    Lt(Field, Value),
    Lte(Field, Value),
    Gte(Field, Value),
    In(Field, Vec<Value>),
}

impl Condition {
    fn field(&self) -> Field {
        match self {
            Condition::Eq(f, _)
            | Condition::Ne(f, _)
            | Condition::Lt(f, _)
            | Condition::Lte(f, _)
            | Condition::Gte(f, _)
            | Condition::In(f, _) => *f,
        }
    }

    fn matches(&self, session: &StudySession) -> bool {
        let actual = self.field().value_of(session);
        match self {
            Condition::Eq(_, v) => actual == *v,
            Condition::Ne(_, v) => actual != *v,
            Condition::Lt(_, v) => same_kind(&actual, v) && actual < *v,
            Condition::Lte(_, v) => same_kind(&actual, v) && actual <= *v,
            Condition::Gte(_, v) => same_kind(&actual, v) && actual >= *v,
            Condition::In(_, values) => values.contains(&actual),
        }
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Result ordering for `find`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    StartAsc,
    StartDesc,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::StartAsc => "start_time ASC, id ASC",
            SortOrder::StartDesc => "start_time DESC, id DESC",
        }
    }
}

/// Conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFilter {
    conditions: Vec<Condition>,
}

impl SessionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn owner(self, owner_id: i64) -> Self {
        self.with(Condition::Eq(Field::OwnerId, Value::Int(owner_id)))
    }

    pub fn id(self, id: &str) -> Self {
        self.with(Condition::Eq(Field::Id, Value::Text(id.to_string())))
    }

    pub fn id_ne(self, id: &str) -> Self {
        self.with(Condition::Ne(Field::Id, Value::Text(id.to_string())))
    }

    pub fn id_in<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = ids.into_iter().map(|id| Value::Text(id.into())).collect();
        self.with(Condition::In(Field::Id, values))
    }

    pub fn status_eq(self, status: SessionStatus) -> Self {
        self.with(Condition::Eq(
            Field::Status,
            Value::Text(status.as_str().to_string()),
        ))
    }

    pub fn notification_sent_ne(self, sent: bool) -> Self {
        self.with(Condition::Ne(Field::NotificationSent, Value::Bool(sent)))
    }

    pub fn start_lt(self, time: DateTime<Utc>) -> Self {
        self.with(Condition::Lt(Field::StartTime, Value::Time(time)))
    }

    pub fn start_gte(self, time: DateTime<Utc>) -> Self {
        self.with(Condition::Gte(Field::StartTime, Value::Time(time)))
    }

    pub fn start_lte(self, time: DateTime<Utc>) -> Self {
        self.with(Condition::Lte(Field::StartTime, Value::Time(time)))
    }

    pub fn end_gte(self, time: DateTime<Utc>) -> Self {
        self.with(Condition::Gte(Field::EndTime, Value::Time(time)))
    }

    /// Candidate neighbours of `session`: same owner, not itself, and
    /// `start < session.end && end >= session.start`.
    ///
    /// The vocabulary has no strict greater-than, so touching intervals are
    /// included here and must be excluded by the exact overlap test.
    pub fn neighbours_of(session: &StudySession) -> Self {
        Self::new()
            .owner(session.owner_id)
            .id_ne(&session.id)
            .start_lt(session.end_time)
            .end_gte(session.start_time)
    }

    /// Evaluate against an in-memory session
    pub fn matches(&self, session: &StudySession) -> bool {
        self.conditions.iter().all(|c| c.matches(session))
    }

    /// Render as a SQL boolean expression with `?` placeholders.
    ///
    /// Returns the expression and the values in placeholder order.
    pub fn to_sql(&self) -> (String, Vec<&Value>) {
        if self.conditions.is_empty() {
            return ("1 = 1".to_string(), Vec::new());
        }

        let mut clauses = Vec::with_capacity(self.conditions.len());
        let mut params = Vec::new();

        for condition in &self.conditions {
            let column = condition.field().column();
            let clause = match condition {
                Condition::Eq(_, v) => {
                    params.push(v);
                    format!("{} = ?", column)
                }
                Condition::Ne(_, v) => {
                    params.push(v);
                    format!("{} <> ?", column)
                }
                Condition::Lt(_, v) => {
                    params.push(v);
                    format!("{} < ?", column)
                }
                Condition::Lte(_, v) => {
                    params.push(v);
                    format!("{} <= ?", column)
                }
                Condition::Gte(_, v) => {
                    params.push(v);
                    format!("{} >= ?", column)
                }
                Condition::In(_, values) if values.is_empty() => "1 = 0".to_string(),
                Condition::In(_, values) => {
                    params.extend(values.iter());
                    let marks = vec!["?"; values.len()].join(", ");
                    format!("{} IN ({})", column, marks)
                }
            };
            clauses.push(clause);
        }

        (clauses.join(" AND "), params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, hour, min, 0).unwrap()
    }

    fn session(owner: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> StudySession {
        StudySession::new(owner, "Focus".into(), None, start, end, at(0, 0))
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = SessionFilter::new();
        assert!(filter.matches(&session(1, at(10, 0), at(11, 0))));
        assert_eq!(filter.to_sql().0, "1 = 1");
    }

    #[test]
    fn test_to_sql_orders_params_with_placeholders() {
        let filter = SessionFilter::new()
            .owner(7)
            .id_ne("abc")
            .start_lt(at(11, 0))
            .id_in(["x", "y"]);

        let (sql, params) = filter.to_sql();
        assert_eq!(
            sql,
            "owner_id = ? AND id <> ? AND start_time < ? AND id IN (?, ?)"
        );
        assert_eq!(
            params,
            vec![
                &Value::Int(7),
                &Value::Text("abc".into()),
                &Value::Time(at(11, 0)),
                &Value::Text("x".into()),
                &Value::Text("y".into()),
            ]
        );
    }

    #[test]
    fn test_empty_membership_matches_nothing() {
        let filter = SessionFilter::new().id_in(Vec::<String>::new());
        assert_eq!(filter.to_sql(), ("1 = 0".to_string(), Vec::new()));
        assert!(!filter.matches(&session(1, at(10, 0), at(11, 0))));
    }

    #[test]
    fn test_time_bounds_are_inclusive_where_named() {
        let s = session(1, at(10, 0), at(11, 0));
        assert!(SessionFilter::new().start_gte(at(10, 0)).matches(&s));
        assert!(SessionFilter::new().start_lte(at(10, 0)).matches(&s));
        assert!(!SessionFilter::new().start_lt(at(10, 0)).matches(&s));
        assert!(SessionFilter::new().end_gte(at(11, 0)).matches(&s));
    }

    #[test]
    fn test_status_and_flag_conditions() {
        let mut s = session(1, at(10, 0), at(11, 0));
        let due = SessionFilter::new()
            .status_eq(SessionStatus::Scheduled)
            .notification_sent_ne(true);
        assert!(due.matches(&s));

        s.notification_sent = true;
        assert!(!due.matches(&s));

        s.notification_sent = false;
        s.status = SessionStatus::Cancelled;
        assert!(!due.matches(&s));
    }

    #[test]
    fn test_neighbours_exclude_self_and_other_owners() {
        let me = session(1, at(10, 0), at(11, 0));
        let filter = SessionFilter::neighbours_of(&me);

        assert!(!filter.matches(&me));
        assert!(!filter.matches(&session(2, at(10, 0), at(11, 0))));
        assert!(filter.matches(&session(1, at(10, 30), at(10, 45))));
        // touching on the left is a candidate, touching on the right is not
        assert!(filter.matches(&session(1, at(9, 0), at(10, 0))));
        assert!(!filter.matches(&session(1, at(11, 0), at(12, 0))));
    }

    #[test]
    fn test_mismatched_value_kinds_never_compare() {
        let s = session(1, at(10, 0), at(11, 0));
        let filter = SessionFilter::new().with(Condition::Lt(Field::StartTime, Value::Int(5)));
        assert!(!filter.matches(&s));
    }
}
