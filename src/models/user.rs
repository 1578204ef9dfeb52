//! User model
//!
//! Accounts of the local identity provider. An account can log in only
//! after its email address has been confirmed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique, stored lowercase)
    pub email: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// When the address was confirmed, if it has been
    pub email_confirmed_at: Option<DateTime<Utc>>,
    /// SHA-256 hex digest of the outstanding confirmation token
    #[serde(skip_serializing)]
    pub confirmation_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create an unconfirmed user.
    ///
    /// The password must already be hashed with `services::credentials::hash_password()`.
    pub fn new(email: String, password_hash: String, confirmation_token_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email: normalize_email(&email),
            password_hash,
            email_confirmed_at: None,
            confirmation_token_hash: Some(confirmation_token_hash),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    /// Name used in greetings: the local part of the address
    pub fn display_name(&self) -> &str {
        display_name_of(&self.email)
    }
}

/// Canonical form of an email address used for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Local part of an address, or the whole string if it has no `@`
pub fn display_name_of(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Minimal shape check: one `@` with a non-empty local part and a dotted domain
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Input for account creation (before password hashing)
#[derive(Debug, Clone, Deserialize)]
pub struct SignupInput {
    pub email: String,
    /// Plaintext password (will be hashed)
    pub password: String,
}
