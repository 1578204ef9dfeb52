//! Outgoing mail delivery
//!
//! [`NotificationSender`] hands a batch of rendered mails to a transport and
//! reports per-message outcomes. A failed message never fails the batch;
//! only a transport that cannot be reached at all does.
//!
//! Implementations:
//! - [`SmtpSender`]: SMTP relay via lettre
//! - [`ResendSender`]: Resend HTTP API via reqwest
//! - [`LogSender`]: writes messages to the log (development)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{EmailConfig, EmailDriver};

/// Reminder payload for one session, before rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderMessage {
    pub session_id: String,
    pub email: String,
    pub display_name: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Pre-formatted, e.g. `1h 30m`
    pub duration: String,
}

/// A rendered mail ready for a transport
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Outcome of one message in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryResult {
    pub to: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(to: &str, message_id: Option<String>) -> Self {
        Self {
            to: to.to_string(),
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(to: &str, error: impl ToString) -> Self {
        Self {
            to: to.to_string(),
            success: false,
            message_id: None,
            error: Some(error.to_string()),
        }
    }
}

/// Batch-level failures
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The transport could not be reached; nothing was sent
    #[error("Mail transport unavailable: {0}")]
    Unavailable(String),

    /// The sender is misconfigured
    #[error("Mail sender misconfigured: {0}")]
    Config(String),
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send every message, returning one result per message in input order
    async fn send_batch(&self, messages: &[OutgoingMail]) -> Result<Vec<DeliveryResult>, SendError>;
}

/// Build the sender selected by configuration
pub fn create_sender(config: &EmailConfig) -> Result<Arc<dyn NotificationSender>, SendError> {
    let from = parse_mailbox(&config.from)?;
    let sender: Arc<dyn NotificationSender> = match config.driver {
        EmailDriver::Log => Arc::new(LogSender),
        EmailDriver::Smtp => Arc::new(SmtpSender::new(config, from)?),
        EmailDriver::Resend => Arc::new(ResendSender::new(config)?),
    };
    Ok(sender)
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SendError> {
    address
        .parse()
        .map_err(|e| SendError::Config(format!("Invalid from address '{}': {}", address, e)))
}

// ============================================================================
// Log-only sender
// ============================================================================

/// Logs every message and reports it delivered
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send_batch(&self, messages: &[OutgoingMail]) -> Result<Vec<DeliveryResult>, SendError> {
        Ok(messages
            .iter()
            .map(|mail| {
                tracing::info!(to = %mail.to, subject = %mail.subject, "Mail (log driver)");
                tracing::debug!("{}", mail.text);
                DeliveryResult::delivered(&mail.to, None)
            })
            .collect())
    }
}

// ============================================================================
// SMTP sender
// ============================================================================

pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    pub fn new(config: &EmailConfig, from: Mailbox) -> Result<Self, SendError> {
        let host = config
            .smtp_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SendError::Config("email.smtp_host is not set".to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| SendError::Config(format!("Failed to create SMTP transport: {}", e)))?
            .port(config.smtp_port);

        if let (Some(user), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build(&self, mail: &OutgoingMail) -> Result<Message, String> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| format!("Invalid recipient: {}", e))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                mail.text.clone(),
                mail.html.clone(),
            ))
            .map_err(|e| format!("Failed to build email: {}", e))
    }
}

#[async_trait]
impl NotificationSender for SmtpSender {
    async fn send_batch(&self, messages: &[OutgoingMail]) -> Result<Vec<DeliveryResult>, SendError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        match self.transport.test_connection().await {
            Ok(true) => {}
            Ok(false) => return Err(SendError::Unavailable("SMTP relay refused connection".into())),
            Err(e) => return Err(SendError::Unavailable(e.to_string())),
        }

        let mut results = Vec::with_capacity(messages.len());
        for mail in messages {
            let result = match self.build(mail) {
                Ok(message) => match self.transport.send(message).await {
                    Ok(response) => DeliveryResult::delivered(
                        &mail.to,
                        response.message().next().map(str::to_string),
                    ),
                    Err(e) => DeliveryResult::failed(&mail.to, e),
                },
                Err(e) => DeliveryResult::failed(&mail.to, e),
            };
            results.push(result);
        }
        Ok(results)
    }
}

// ============================================================================
// Resend HTTP API sender
// ============================================================================

pub struct ResendSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ResendAccepted {
    id: Option<String>,
}

impl ResendSender {
    pub fn new(config: &EmailConfig) -> Result<Self, SendError> {
        let api_key = config
            .resend_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SendError::Config("email.resend_api_key is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| SendError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/emails", config.resend_base_url.trim_end_matches('/')),
            api_key,
            from: config.from.clone(),
        })
    }

    async fn send_one(&self, mail: &OutgoingMail) -> DeliveryResult {
        let body = ResendEmail {
            from: &self.from,
            to: [&mail.to],
            subject: &mail.subject,
            html: &mail.html,
            text: &mail.text,
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return DeliveryResult::failed(&mail.to, e),
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return DeliveryResult::failed(&mail.to, format!("HTTP {}: {}", status, detail));
        }

        let id = response
            .json::<ResendAccepted>()
            .await
            .ok()
            .and_then(|accepted| accepted.id);
        DeliveryResult::delivered(&mail.to, id)
    }
}

#[async_trait]
impl NotificationSender for ResendSender {
    async fn send_batch(&self, messages: &[OutgoingMail]) -> Result<Vec<DeliveryResult>, SendError> {
        Ok(join_all(messages.iter().map(|mail| self.send_one(mail))).await)
    }
}

// ============================================================================
// Test double
// ============================================================================

#[cfg(test)]
pub use recording::RecordingSender;

#[cfg(test)]
mod recording {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every batch; can fail chosen recipients or the whole batch
    #[derive(Default)]
    pub struct RecordingSender {
        pub batches: Mutex<Vec<Vec<OutgoingMail>>>,
        failing_recipients: Mutex<HashSet<String>>,
        unavailable: Mutex<bool>,
    }

    impl RecordingSender {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_recipient(&self, email: &str) {
            self.failing_recipients.lock().unwrap().insert(email.to_string());
        }

        pub fn set_unavailable(&self) {
            *self.unavailable.lock().unwrap() = true;
        }

        pub fn sent(&self) -> Vec<OutgoingMail> {
            self.batches.lock().unwrap().iter().flatten().cloned().collect()
        }
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send_batch(
            &self,
            messages: &[OutgoingMail],
        ) -> Result<Vec<DeliveryResult>, SendError> {
            if *self.unavailable.lock().unwrap() {
                return Err(SendError::Unavailable("test transport down".into()));
            }
            self.batches.lock().unwrap().push(messages.to_vec());
            let failing = self.failing_recipients.lock().unwrap();
            Ok(messages
                .iter()
                .map(|mail| {
                    if failing.contains(&mail.to) {
                        DeliveryResult::failed(&mail.to, "rejected by test transport")
                    } else {
                        DeliveryResult::delivered(&mail.to, Some(format!("id-{}", mail.to)))
                    }
                })
                .collect())
        }
    }
}
