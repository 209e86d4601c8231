//! Lokify - locker rental service

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lokify::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{SqlxLockerRepository, SqlxSessionRepository, SqlxUserRepository},
    },
    services::{
        create_notifier, ExpiryReconciler, LockerService, LoginRateLimiter, ReservationService,
        UserService,
    },
};

/// Seconds between two purges of expired sessions and stale throttle entries
const MAINTENANCE_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lokify=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Lokify...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Create repositories
    let locker_repo = SqlxLockerRepository::boxed(pool.clone());
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());

    let notifier = create_notifier(&config.mail)?;

    // Initialize services
    let reservation_service = Arc::new(ReservationService::new(
        locker_repo.clone(),
        config.reservation.max_days,
    ));
    let locker_service = Arc::new(LockerService::new(
        locker_repo.clone(),
        reservation_service.clone(),
    ));
    let user_service = Arc::new(UserService::new(
        user_repo.clone(),
        session_repo,
        notifier.clone(),
        config.auth.session_ttl_hours,
    ));
    let reconciler = Arc::new(ExpiryReconciler::new(
        locker_repo,
        user_repo,
        notifier,
        config.scheduler.clone(),
    ));
    let rate_limiter = Arc::new(LoginRateLimiter::new());

    if config.scheduler.enabled {
        reconciler.start().await;
    } else {
        tracing::info!("Expiry reconciler disabled, use POST /api/lockers/update-statuses");
    }

    // Purge expired sessions and throttle entries
    {
        let users = user_service.clone();
        let limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match users.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Purged {} expired session(s)", n),
                    Err(e) => tracing::warn!("Session purge failed: {}", e),
                }
                limiter.cleanup().await;
            }
        });
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState {
        config: Arc::new(config),
        pool: pool.clone(),
        user_service,
        locker_service,
        reservation_service,
        reconciler: reconciler.clone(),
        rate_limiter,
    };

    // Build router
    let app = api::build_router(state)?;

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reconciler.stop().await;
    pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
