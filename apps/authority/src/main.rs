//! # Outpost Authority
//!
//! HTTP server for edge sync plus the side-effect workers.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Authority Process                                │
//! │                                                                         │
//! │  Edge agent ───► HTTP (8080) ───► routes ───► SQLite                   │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │                               work queues ───► mail / webhooks /       │
//! │                                                Discord                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use outpost_authority::auth::bootstrap_token;
use outpost_authority::workers::{
    outbound_client, register_workers, reload_settings, DiscordRoleSyncer, LogMailSender,
};
use outpost_authority::{build_router, AppState, AuthorityConfig};
use outpost_db::{Database, DbConfig};
use outpost_engine::{CancellationToken, EngineError, ProcessSupervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Outpost authority...");

    // Load configuration
    let config = AuthorityConfig::load()?;
    info!(
        bind = %config.bind_addr,
        database = %config.database_path.display(),
        "Configuration loaded"
    );

    // Open database (runs migrations)
    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("Database ready");

    if let Some(token) = bootstrap_token(&db.tokens()).await? {
        // Shown once; only the operator starting the process sees it
        println!("Bootstrap API token (store it now, it is not shown again): {token}");
    }

    // Create shared state
    let state = Arc::new(AppState::new(db));
    reload_settings(&state.db, &state.settings).await?;

    // Bind before starting anything so a busy port fails startup
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP listener bound");

    let http = outbound_client()?;
    let roles = DiscordRoleSyncer::new(
        http.clone(),
        config.discord_api_base.clone(),
        state.settings.clone(),
    );

    let mut supervisor = ProcessSupervisor::new();

    let app = build_router(state.clone());
    supervisor.add("http", move |cancel| async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        Ok::<(), EngineError>(())
    });

    register_workers(&mut supervisor, &state, &config, http, LogMailSender, roles);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    supervisor.run_or_exit(shutdown).await;

    state.db.close().await;
    info!("Authority shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
