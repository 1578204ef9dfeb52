//! Login token model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A login token issued by the local identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Token value (UUID v4)
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthSession {
    /// Issue a new token for `user_id` valid for `lifetime`
    pub fn issue(user_id: i64, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + lifetime,
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_sets_expiry() {
        let session = AuthSession::issue(7, Duration::days(7));
        assert_eq!(session.user_id, 7);
        assert!(!session.is_expired());
        assert_eq!((session.expires_at - session.created_at).num_days(), 7);
    }

    #[test]
    fn test_negative_lifetime_is_expired() {
        let session = AuthSession::issue(7, Duration::seconds(-1));
        assert!(session.is_expired());
    }
}
