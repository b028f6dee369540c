use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::HeaderName;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod routes;
mod services;
#[cfg(test)]
mod test_utils;

use config::Config;
use db::{SqliteUserDirectory, SqliteWishlistStore, UserDirectory, WishlistStore};
use services::clock::{Clock, SystemClock};
use services::sink::NotificationSink;
use services::wishlist::WishlistService;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub store: Arc<dyn WishlistStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub sink: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
    pub wishlist: WishlistService,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/wishlist", routes::wishlist::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
                .allow_headers([
                    http::header::CONTENT_TYPE,
                    http::header::ACCEPT,
                    HeaderName::from_static(routes::current_user::USER_ID_HEADER),
                ]),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offer_alerts=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let tz = config.clock.tz()?;

    tracing::info!("Starting offer alerts service (reference timezone {})", tz);

    // Without the store nothing works; this is the only fatal startup failure.
    let pool = services::init::init_db(&config).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(tz));
    let store: Arc<dyn WishlistStore> = Arc::new(SqliteWishlistStore::new(pool.clone()));
    let directory: Arc<dyn UserDirectory> = Arc::new(SqliteUserDirectory::new(pool.clone()));
    let sink = services::init::build_sink(&config)?;
    let wishlist = WishlistService::new(
        store.clone(),
        clock.clone(),
        config.wishlist.offer_window(),
        config.scheduler.store_timeout(),
    )?;

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        store,
        directory,
        sink,
        clock,
        wishlist,
    });

    // Shutdown notifier for background workers
    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let bg_handles = services::init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    let app = router(app_state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(listener, app.into_make_service());

    let shutdown_tx_clone = shutdown_tx.clone();
    let signal_fut = async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {},
                        _ = term.recv() => {},
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to bind SIGTERM, listening for Ctrl+C only: {}", e);
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        tracing::info!("Shutdown signal received, notifying background workers");
        let _ = shutdown_tx_clone.send(());
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Signal handler completed; server future dropped to stop accepting new connections");
        }
    }

    // Give the scheduler time to finish its current entry.
    let shutdown_wait = Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for background workers to exit",
        shutdown_wait.as_secs()
    );

    let bg_wait = async {
        for h in bg_handles {
            if let Err(e) = h.await {
                tracing::warn!("Background worker ended abnormally: {}", e);
            }
        }
    };
    if tokio::time::timeout(shutdown_wait, bg_wait).await.is_err() {
        tracing::warn!("Background workers did not exit in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
