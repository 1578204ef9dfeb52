//! Quiet Hours - Study session scheduling with email reminders

use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiet_hours::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{SqlxAuthSessionRepository, SqlxStudySessionRepository, SqlxUserRepository},
    },
    services::{
        create_sender, LoginRateLimiter, MailTemplates, ReminderScanner, StudySessionService,
        UserService,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quiet_hours=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Quiet Hours...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");
    if config.cron.secret.as_deref().map_or(true, str::is_empty) {
        tracing::warn!("cron.secret is not set; the reminder trigger endpoint will reject every call");
    }

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Mail delivery
    let sender = create_sender(&config.email)?;
    let templates = Arc::new(MailTemplates::load()?);
    tracing::info!("Mail driver: {:?}", config.email.driver);

    // Repositories and services
    let study_repo = SqlxStudySessionRepository::boxed(pool.clone());
    let user_service = Arc::new(UserService::new(
        SqlxUserRepository::boxed(pool.clone()),
        SqlxAuthSessionRepository::boxed(pool.clone()),
        sender.clone(),
        templates.clone(),
        config.auth.clone(),
        config.server.public_url.clone(),
    ));
    let study_sessions = Arc::new(StudySessionService::new(study_repo.clone()));
    let scanner = Arc::new(ReminderScanner::new(
        study_repo,
        user_service.clone(),
        sender,
        templates,
        config.reminder.clone(),
    ));
    let rate_limiter = Arc::new(LoginRateLimiter::new());

    // Optional in-process scan, for deployments without an external scheduler
    if config.reminder.run_in_process {
        let scanner = scanner.clone();
        let period = Duration::from_secs(config.reminder.poll_interval_seconds.max(1));
        tracing::info!("In-process reminder scan every {}s", period.as_secs());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match scanner.run(Utc::now()).await {
                    Ok(summary) if summary.sessions_found > 0 => tracing::info!(
                        found = summary.sessions_found,
                        sent = summary.emails_successful,
                        failed = summary.emails_failed,
                        "{}",
                        summary.message
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::error!("Reminder scan failed: {}", e),
                }
            }
        });
    }

    // Expired login tokens and stale rate limiter entries (every 5 minutes)
    {
        let user_service = user_service.clone();
        let limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                match user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Removed {} expired login sessions", n),
                    Err(e) => tracing::warn!("Login session cleanup failed: {}", e),
                }
                limiter.cleanup().await;
            }
        });
    }

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        user_service: user_service.clone(),
        identity: user_service,
        study_sessions,
        scanner,
        rate_limiter,
    };

    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
