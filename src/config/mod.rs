//! Configuration management
//!
//! This module handles loading and parsing configuration for the Quiet Hours service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Account and login settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Reminder scanner settings
    #[serde(default)]
    pub reminder: ReminderConfig,
    /// Scheduler trigger settings
    #[serde(default)]
    pub cron: CronConfig,
    /// Outgoing mail settings
    #[serde(default)]
    pub email: EmailConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Externally reachable base URL, used in confirmation links
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_url: default_public_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/quiet-hours.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

impl DatabaseDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseDriver::Sqlite => "sqlite",
            DatabaseDriver::Mysql => "mysql",
        }
    }
}

/// Account and login configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a login token in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Confirm new accounts immediately instead of mailing a link (development only)
    #[serde(default)]
    pub auto_confirm: bool,
    /// Minimum accepted password length
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            auto_confirm: false,
            min_password_length: default_min_password_length(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_min_password_length() -> usize {
    8
}

/// Reminder scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// How far ahead of the session start the reminder goes out
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,
    /// Width of the due window; should cover the polling cadence
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    /// Horizon of the read-only upcoming inspection
    #[serde(default = "default_upcoming_minutes")]
    pub upcoming_minutes: i64,
    /// Maximum entries returned by the upcoming inspection
    #[serde(default = "default_upcoming_limit")]
    pub upcoming_limit: i64,
    /// Run the scanner on an in-process timer as well as via the HTTP trigger
    #[serde(default)]
    pub run_in_process: bool,
    /// Cadence of the in-process timer
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lead_minutes: default_lead_minutes(),
            window_minutes: default_window_minutes(),
            upcoming_minutes: default_upcoming_minutes(),
            upcoming_limit: default_upcoming_limit(),
            run_in_process: false,
            poll_interval_seconds: default_poll_interval_seconds(),
        }
    }
}

fn default_lead_minutes() -> i64 {
    10
}

fn default_window_minutes() -> i64 {
    2
}

fn default_upcoming_minutes() -> i64 {
    60
}

fn default_upcoming_limit() -> i64 {
    10
}

fn default_poll_interval_seconds() -> u64 {
    60
}

/// External scheduler trigger configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronConfig {
    /// Shared secret expected as `Authorization: Bearer <secret>`.
    /// When unset, every trigger call is rejected.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Which sender implementation to use
    #[serde(default)]
    pub driver: EmailDriver,
    /// Sender address, `Name <address>` form accepted
    #[serde(default = "default_email_from")]
    pub from: String,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub resend_api_key: Option<String>,
    #[serde(default = "default_resend_base_url")]
    pub resend_base_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            driver: EmailDriver::default(),
            from: default_email_from(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            resend_api_key: None,
            resend_base_url: default_resend_base_url(),
        }
    }
}

fn default_email_from() -> String {
    "Quiet Hours <onboarding@resend.dev>".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_resend_base_url() -> String {
    "https://api.resend.com".to_string()
}

/// Mail sender driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmailDriver {
    /// Write messages to the log only (default)
    #[default]
    Log,
    /// SMTP relay
    Smtp,
    /// Resend HTTP API
    Resend,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// One week
const MAX_MINUTES: i64 = 7 * 24 * 60;
const MAX_UPCOMING_LIMIT: i64 = 1000;
const MAX_POLL_INTERVAL_SECONDS: u64 = 24 * 60 * 60;
const MAX_SESSION_DAYS: i64 = 365;

fn check_range<T>(key: &str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(ConfigError::ValidationError(format!(
            "{} must be between {} and {} (got {})",
            key, min, max, value
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `QUIET_HOURS_<SECTION>_<KEY>`, e.g.
    /// - QUIET_HOURS_SERVER_PORT
    /// - QUIET_HOURS_DATABASE_URL
    /// - QUIET_HOURS_CRON_SECRET
    /// - QUIET_HOURS_EMAIL_DRIVER
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the scanner or login misbehave.
    ///
    /// Durations are capped so the scan window and session expiry stay far
    /// inside the timestamp range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reminder = &self.reminder;
        check_range("reminder.lead_minutes", reminder.lead_minutes, 0, MAX_MINUTES)?;
        check_range("reminder.window_minutes", reminder.window_minutes, 1, MAX_MINUTES)?;
        check_range("reminder.upcoming_minutes", reminder.upcoming_minutes, 1, MAX_MINUTES)?;
        check_range("reminder.upcoming_limit", reminder.upcoming_limit, 1, MAX_UPCOMING_LIMIT)?;
        if reminder.run_in_process {
            check_range(
                "reminder.poll_interval_seconds",
                reminder.poll_interval_seconds,
                1,
                MAX_POLL_INTERVAL_SECONDS,
            )?;
        }
        check_range("auth.session_days", self.auth.session_days, 1, MAX_SESSION_DAYS)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the process environment in production)
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("QUIET_HOURS_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("QUIET_HOURS_SERVER_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(origin) = lookup("QUIET_HOURS_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Some(url) = lookup("QUIET_HOURS_SERVER_PUBLIC_URL") {
            self.server.public_url = url;
        }

        if let Some(driver) = lookup("QUIET_HOURS_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Some(url) = lookup("QUIET_HOURS_DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(flag) = lookup("QUIET_HOURS_AUTH_AUTO_CONFIRM") {
            self.auth.auto_confirm = matches!(flag.as_str(), "1" | "true");
        }

        if let Some(lead) = lookup("QUIET_HOURS_REMINDER_LEAD_MINUTES").and_then(|v| v.parse().ok()) {
            self.reminder.lead_minutes = lead;
        }
        if let Some(window) =
            lookup("QUIET_HOURS_REMINDER_WINDOW_MINUTES").and_then(|v| v.parse().ok())
        {
            self.reminder.window_minutes = window;
        }
        if let Some(flag) = lookup("QUIET_HOURS_REMINDER_RUN_IN_PROCESS") {
            self.reminder.run_in_process = matches!(flag.as_str(), "1" | "true");
        }

        if let Some(secret) = lookup("QUIET_HOURS_CRON_SECRET") {
            self.cron.secret = Some(secret).filter(|s| !s.is_empty());
        }

        if let Some(driver) = lookup("QUIET_HOURS_EMAIL_DRIVER") {
            match driver.to_lowercase().as_str() {
                "log" => self.email.driver = EmailDriver::Log,
                "smtp" => self.email.driver = EmailDriver::Smtp,
                "resend" => self.email.driver = EmailDriver::Resend,
                _ => {}
            }
        }
        if let Some(from) = lookup("QUIET_HOURS_EMAIL_FROM") {
            self.email.from = from;
        }
        if let Some(host) = lookup("QUIET_HOURS_EMAIL_SMTP_HOST") {
            self.email.smtp_host = Some(host);
        }
        if let Some(user) = lookup("QUIET_HOURS_EMAIL_SMTP_USERNAME") {
            self.email.smtp_username = Some(user);
        }
        if let Some(password) = lookup("QUIET_HOURS_EMAIL_SMTP_PASSWORD") {
            self.email.smtp_password = Some(password);
        }
        if let Some(key) = lookup("QUIET_HOURS_EMAIL_RESEND_API_KEY") {
            self.email.resend_api_key = Some(key);
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}
