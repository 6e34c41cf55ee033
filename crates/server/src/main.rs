//! livepoll server entry point.

use std::sync::Arc;

use livepoll_api::{AppState, app};
use livepoll_common::Config;
use livepoll_common::config::StoreBackend;
use livepoll_core::JwtAdminVerifier;
use livepoll_db::{MemoryPollStore, PollRepository, PollStore};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Open the configured poll store.
async fn open_store(config: &Config) -> Result<Arc<dyn PollStore>, Box<dyn std::error::Error>> {
    match config.database.backend {
        StoreBackend::Postgres => {
            let db = livepoll_db::init(config).await?;
            info!("Connected to database");

            info!("Running database migrations...");
            livepoll_db::migrate(&db).await?;
            info!("Migrations completed");

            Ok(Arc::new(PollRepository::new(Arc::new(db))))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory poll store, polls are lost on restart");
            Ok(Arc::new(MemoryPollStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livepoll=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting livepoll server...");

    let config = Config::load()?;
    let store = open_store(&config).await?;

    let verifier = Arc::new(JwtAdminVerifier::from_config(&config.auth));
    let state = AppState::new(store, verifier, &config.sessions, &config.limits);

    let app = app(state).layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
