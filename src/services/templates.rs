//! Mail templates
//!
//! Bodies are Tera templates embedded in the binary from `templates/email/`.
//! Every mail has an HTML part (`*.html`, auto-escaped) and a plain-text
//! part (`*.txt`).

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_embed::RustEmbed;
use std::error::Error as _;
use tera::{Context as TeraContext, Tera};

use super::notification::{OutgoingMail, ReminderMessage};

#[derive(RustEmbed)]
#[folder = "templates/email/"]
#[include = "*.html"]
#[include = "*.txt"]
struct EmailAssets;

/// Render a timestamp the way reminder mails show it,
/// e.g. `Friday, October 16, 2026 at 10:00 AM UTC`
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%A, %B %-d, %Y at %-I:%M %p UTC").to_string()
}

/// `"{h}h {m}m"` when at least an hour, otherwise `"{m}m"`
pub fn format_duration(start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    let minutes = (*end - *start).num_minutes().max(0);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

pub struct MailTemplates {
    tera: Tera,
}

impl MailTemplates {
    /// Compile all embedded templates
    pub fn load() -> Result<Self> {
        let mut tera = Tera::default();
        for name in EmailAssets::iter() {
            let file = EmailAssets::get(&name)
                .with_context(|| format!("Embedded template disappeared: {}", name))?;
            let source = std::str::from_utf8(&file.data)
                .with_context(|| format!("Template is not UTF-8: {}", name))?;
            tera.add_raw_template(&name, source)
                .map_err(|e| anyhow!("Failed to add template {}: {}", name, e))?;
        }
        Ok(Self { tera })
    }

    fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            let mut message = format!("Failed to render '{}': {}", template, e);
            let mut source = e.source();
            while let Some(cause) = source {
                message.push_str(&format!("\n  Caused by: {}", cause));
                source = cause.source();
            }
            anyhow!(message)
        })
    }

    /// Build the reminder mail for one session
    pub fn reminder(&self, message: &ReminderMessage, lead_minutes: i64) -> Result<OutgoingMail> {
        let mut context = TeraContext::new();
        context.insert("display_name", &message.display_name);
        context.insert("title", &message.title);
        context.insert("description", &message.description);
        context.insert("start", &format_timestamp(&message.start_time));
        context.insert("end", &format_timestamp(&message.end_time));
        context.insert("duration", &message.duration);
        context.insert("lead_minutes", &lead_minutes);

        Ok(OutgoingMail {
            to: message.email.clone(),
            subject: format!(
                "Your study session \"{}\" starts in {} minutes!",
                message.title, lead_minutes
            ),
            html: self.render("reminder.html", &context)?,
            text: self.render("reminder.txt", &context)?,
        })
    }

    /// Build the account confirmation mail
    pub fn confirmation(&self, email: &str, display_name: &str, confirm_url: &str) -> Result<OutgoingMail> {
        let mut context = TeraContext::new();
        context.insert("display_name", display_name);
        context.insert("confirm_url", confirm_url);

        Ok(OutgoingMail {
            to: email.to_string(),
            subject: "Confirm your Quiet Hours account".to_string(),
            html: self.render("confirm.html", &context)?,
            text: self.render("confirm.txt", &context)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(description: Option<&str>) -> ReminderMessage {
        let start = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 10, 16, 11, 30, 0).unwrap();
        ReminderMessage {
            session_id: "s-1".into(),
            email: "ada@example.com".into(),
            display_name: "ada".into(),
            title: "Linear <Algebra>".into(),
            description: description.map(str::to_string),
            start_time: start,
            end_time: end,
            duration: format_duration(&start, &end),
        }
    }

    #[test]
    fn test_format_timestamp() {
        let t = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();
        assert_eq!(format_timestamp(&t), "Friday, October 16, 2026 at 10:00 AM UTC");
        let t = Utc.with_ymd_and_hms(2026, 1, 5, 15, 7, 0).unwrap();
        assert_eq!(format_timestamp(&t), "Monday, January 5, 2026 at 3:07 PM UTC");
    }

    #[test]
    fn test_format_duration() {
        let start = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();
        assert_eq!(format_duration(&start, &(start + chrono::Duration::minutes(45))), "45m");
        assert_eq!(format_duration(&start, &(start + chrono::Duration::minutes(60))), "1h 0m");
        assert_eq!(format_duration(&start, &(start + chrono::Duration::minutes(135))), "2h 15m");
    }

    #[test]
    fn test_reminder_mail() {
        let templates = MailTemplates::load().expect("templates should compile");
        let mail = templates.reminder(&message(Some("Chapter 4")), 10).unwrap();

        assert_eq!(mail.to, "ada@example.com");
        assert_eq!(
            mail.subject,
            "Your study session \"Linear <Algebra>\" starts in 10 minutes!"
        );
        assert!(mail.html.contains("Hi ada,"));
        assert!(mail.html.contains("Linear &lt;Algebra&gt;"));
        assert!(mail.html.contains("Chapter 4"));
        assert!(mail.html.contains("1h 30m"));
        assert!(mail.text.contains("Linear <Algebra>"));
        assert!(mail.text.contains("Friday, October 16, 2026 at 10:00 AM UTC"));
    }

    #[test]
    fn test_reminder_without_description() {
        let templates = MailTemplates::load().unwrap();
        let mail = templates.reminder(&message(None), 10).unwrap();
        assert!(!mail.text.contains("Chapter"));
        assert!(mail.text.contains("Duration:   1h 30m"));
    }

    #[test]
    fn test_confirmation_mail() {
        let templates = MailTemplates::load().unwrap();
        let url = "http://localhost:8080/api/v1/auth/confirm?token=abc";
        let mail = templates.confirmation("ada@example.com", "ada", url).unwrap();
        assert_eq!(mail.to, "ada@example.com");
        assert!(mail.text.contains(url));
        assert!(mail.html.contains("Confirm email"));
    }
}
