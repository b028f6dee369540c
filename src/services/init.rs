//! Initialization helpers for the application:
//! - database connection + migrations
//! - notification sink selection
//! - background worker spawn helpers

use std::{path::Path, str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::Config;
use crate::services::scheduler::{ExpiryScheduler, SchedulerSettings};
use crate::services::sink::{LogSink, NotificationSink, TwilioSink};

/// Database file named by a `sqlite:` URL, with any `?mode=...` parameters
/// dropped. `None` for an in-memory database.
pub fn sqlite_file_path(db_url: &str) -> Option<&Path> {
    let rest = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))
        .unwrap_or(db_url);
    let path = rest.split('?').next().unwrap_or(rest);

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(Path::new(path))
    }
}

/// Open the SQLite store and run migrations.
///
/// Creates the parent directory of the database file when needed. Any error
/// here is fatal: the service does not start without its store.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;

    match sqlite_file_path(db_url) {
        Some(file) => {
            tracing::info!("Opening SQLite store at {}", file.display());
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }
        None => tracing::warn!("Using an in-memory SQLite store; entries are lost on restart"),
    }

    let connect_options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("Invalid DATABASE_URL {:?}", db_url))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.scheduler.store_timeout())
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Pick the outbound channel: Twilio when credentials are configured,
/// otherwise a log-only sink so the rest of the service still runs.
pub fn build_sink(config: &Config) -> Result<Arc<dyn NotificationSink>> {
    match TwilioSink::from_config(&config.messaging, config.scheduler.send_timeout())? {
        Some(twilio) => {
            tracing::info!(
                "Offer alerts will be delivered via Twilio ({})",
                config.messaging.channel
            );
            Ok(Arc::new(twilio))
        }
        None => {
            tracing::warn!("Twilio credentials not configured; offer alerts will only be logged");
            Ok(Arc::new(LogSink))
        }
    }
}

/// Spawn background workers:
/// - the wishlist expiry scheduler
///
/// Returns the `JoinHandle`s so callers can await shutdown. Each worker
/// listens for a shutdown notification on `shutdown`.
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if !state.config.scheduler.enabled {
        tracing::info!("Expiry scheduler disabled by configuration");
        return handles;
    }

    let scheduler = Arc::new(ExpiryScheduler::new(
        state.store.clone(),
        state.directory.clone(),
        state.sink.clone(),
        state.clock.clone(),
        SchedulerSettings::from(&state.config.scheduler),
    ));
    handles.push(scheduler.spawn(&shutdown));

    handles
}
