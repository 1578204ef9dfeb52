//! Data models
//!
//! Entities persisted by the store and the inputs accepted by the services:
//! - `StudySession` and its lifecycle status
//! - `User` accounts of the local identity provider
//! - `AuthSession` login tokens

mod auth_session;
mod study_session;
mod user;

pub use auth_session::AuthSession;
pub use study_session::{
    CreateStudySessionInput, DisplayStatus, SessionStatus, StudySession,
    UpdateStudySessionInput, DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS,
};
pub use user::{display_name_of, is_valid_email, normalize_email, SignupInput, User};
