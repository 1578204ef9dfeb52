//! Services layer - Business logic
//!
//! Services implement the booking and reminder rules on top of the
//! repositories and the external seams (identity, mail delivery).

pub mod credentials;
pub mod identity;
pub mod notification;
pub mod rate_limiter;
pub mod reminder;
pub mod scheduling;
pub mod study_session;
pub mod templates;
pub mod user;

pub use credentials::{hash_password, verify_password};
pub use identity::{Identity, IdentityError, IdentityProvider};
pub use notification::{
    create_sender, DeliveryResult, NotificationSender, OutgoingMail, ReminderMessage, SendError,
};
pub use rate_limiter::LoginRateLimiter;
pub use reminder::{ReminderError, ReminderScanner, ReminderWindow, ScanSummary, UpcomingReport};
pub use scheduling::{find_conflict, overlaps, Interval};
pub use study_session::{StudySessionError, StudySessionService};
pub use templates::MailTemplates;
pub use user::{SignupOutcome, UserService, UserServiceError};
