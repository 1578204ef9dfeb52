//! Identity resolution
//!
//! The booking API authenticates callers and the reminder scanner resolves
//! session owners through [`IdentityProvider`]. Failures are always
//! reported; a missing identity is never replaced by a default.

use async_trait::async_trait;
use serde::Serialize;

use crate::models::display_name_of;

/// Who a user is, as far as scheduling and mail are concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
    pub confirmed: bool,
}

impl Identity {
    pub fn display_name(&self) -> &str {
        display_name_of(&self.email)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Token missing, unknown or expired
    #[error("Not authenticated")]
    Unauthenticated,

    /// No user with that id
    #[error("Identity not found")]
    NotFound,

    /// The backing store failed
    #[error("Identity provider failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a login token to its user
    async fn authenticate(&self, token: &str) -> Result<Identity, IdentityError>;

    /// Resolve a user id, e.g. a session owner
    async fn lookup(&self, user_id: i64) -> Result<Identity, IdentityError>;
}

#[cfg(test)]
pub use fixed::FixedIdentityProvider;
