//! User service
//!
//! The local identity provider:
//! - Signup with email confirmation (or immediate confirmation in development)
//! - Login/logout with expiring login tokens
//! - Token validation and owner lookup for the rest of the service

use crate::config::AuthConfig;
use crate::db::repositories::{AuthSessionRepository, UserRepository};
use crate::models::{is_valid_email, normalize_email, AuthSession, SignupInput, User};
use crate::services::credentials::{
    check_password_policy, hash_password, token_digest, verify_password, ConfirmationToken,
};
use crate::services::identity::{Identity, IdentityError, IdentityProvider};
use crate::services::notification::NotificationSender;
use crate::services::templates::MailTemplates;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    /// Credentials are right but the address was never confirmed
    #[error("Email not confirmed")]
    EmailNotConfirmed,

    /// Confirmation token unknown or already used
    #[error("Invalid or expired confirmation link")]
    InvalidToken,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Result of a signup
#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub user: User,
    /// False when the account was confirmed on creation
    pub needs_confirmation: bool,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn AuthSessionRepository>,
    sender: Arc<dyn NotificationSender>,
    templates: Arc<MailTemplates>,
    config: AuthConfig,
    public_url: String,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn AuthSessionRepository>,
        sender: Arc<dyn NotificationSender>,
        templates: Arc<MailTemplates>,
        config: AuthConfig,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            sender,
            templates,
            config,
            public_url: public_url.into(),
        }
    }

    /// Create an account.
    ///
    /// Unless `auth.auto_confirm` is set, the account starts unconfirmed
    /// and a confirmation link is mailed. A failed mail does not undo the
    /// signup; it is logged.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed email or a short password
    /// - `UserExists` if the email is already registered
    /// - `InternalError` for database errors
    pub async fn signup(&self, input: SignupInput) -> Result<SignupOutcome, UserServiceError> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(UserServiceError::ValidationError(
                "Invalid email address".to_string(),
            ));
        }
        check_password_policy(&input.password, self.config.min_password_length)
            .map_err(UserServiceError::ValidationError)?;

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(
                "An account with this email already exists".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password)?;
        let token = ConfirmationToken::generate()?;
        let mut user = self
            .user_repo
            .create(&User::new(email, password_hash, token.digest))
            .await
            .context("Failed to create user")?;

        if self.config.auto_confirm {
            let now = Utc::now();
            self.user_repo
                .confirm(user.id, now)
                .await
                .context("Failed to confirm user")?;
            user.email_confirmed_at = Some(now);
            user.confirmation_token_hash = None;
            tracing::info!(user_id = user.id, "Account created and auto-confirmed");
            return Ok(SignupOutcome {
                user,
                needs_confirmation: false,
            });
        }

        self.send_confirmation(&user, &token.plain).await;
        tracing::info!(user_id = user.id, "Account created, awaiting confirmation");
        Ok(SignupOutcome {
            user,
            needs_confirmation: true,
        })
    }

    async fn send_confirmation(&self, user: &User, token: &str) {
        let url = format!(
            "{}/api/v1/auth/confirm?token={}",
            self.public_url.trim_end_matches('/'),
            token
        );
        let mail = match self
            .templates
            .confirmation(&user.email, user.display_name(), &url)
        {
            Ok(mail) => mail,
            Err(e) => {
                tracing::error!(user_id = user.id, "Failed to render confirmation mail: {:#}", e);
                return;
            }
        };

        match self.sender.send_batch(std::slice::from_ref(&mail)).await {
            Ok(results) => {
                for result in results.iter().filter(|r| !r.success) {
                    tracing::warn!(
                        user_id = user.id,
                        "Confirmation mail not delivered: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            Err(e) => tracing::error!(user_id = user.id, "Confirmation mail not sent: {}", e),
        }
    }

    /// Confirm an account from the token in its confirmation link.
    ///
    /// Tokens are single-use: confirming clears the stored digest.
    pub async fn confirm_email(&self, token: &str) -> Result<User, UserServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(UserServiceError::InvalidToken);
        }

        let mut user = self
            .user_repo
            .get_by_confirmation_hash(&token_digest(token))
            .await
            .context("Failed to look up confirmation token")?
            .ok_or(UserServiceError::InvalidToken)?;

        let now = Utc::now();
        self.user_repo
            .confirm(user.id, now)
            .await
            .context("Failed to confirm user")?;
        user.email_confirmed_at = Some(now);
        user.confirmation_token_hash = None;
        tracing::info!(user_id = user.id, "Email confirmed");
        Ok(user)
    }

    /// Check credentials and issue a login token.
    ///
    /// # Errors
    ///
    /// - `AuthenticationError` for an unknown email or wrong password
    /// - `EmailNotConfirmed` for correct credentials on an unconfirmed account
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, AuthSession), UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let user = self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(invalid());
        }
        if !user.is_confirmed() {
            return Err(UserServiceError::EmailNotConfirmed);
        }

        let session = self
            .session_repo
            .create(&AuthSession::issue(
                user.id,
                Duration::days(self.config.session_days),
            ))
            .await
            .context("Failed to create session")?;

        Ok((user, session))
    }

    /// Invalidate a login token
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a login token to its user.
    ///
    /// Unknown and expired tokens yield `None`; expired ones are removed.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to remove expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    /// Delete all expired login tokens; returns how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }
}

fn identity_of(user: &User) -> Identity {
    Identity {
        user_id: user.id,
        email: user.email.clone(),
        confirmed: user.is_confirmed(),
    }
}

#[async_trait]
impl IdentityProvider for UserService {
    async fn authenticate(&self, token: &str) -> Result<Identity, IdentityError> {
        match self.validate_session(token).await {
            Ok(Some(user)) => Ok(identity_of(&user)),
            Ok(None) => Err(IdentityError::Unauthenticated),
            Err(e) => Err(IdentityError::Upstream(anyhow::Error::new(e))),
        }
    }

    async fn lookup(&self, user_id: i64) -> Result<Identity, IdentityError> {
        match self.get_by_id(user_id).await {
            Ok(Some(user)) => Ok(identity_of(&user)),
            Ok(None) => Err(IdentityError::NotFound),
            Err(e) => Err(IdentityError::Upstream(anyhow::Error::new(e))),
        }
    }
}
