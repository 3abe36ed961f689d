//! # Outpost Edge Agent
//!
//! ```text
//! edge-agent [--config <path>]
//! ```
//!
//! Without `--config` the platform config directory is searched for
//! `edge.toml`; `OUTPOST_*` environment variables override either.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use outpost_edge_agent::{build_router, run_controller, DryRunController};
use outpost_engine::{CancellationToken, EngineError, ProcessSupervisor};
use outpost_sync::{EdgeConfig, EdgeSyncClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Outpost edge agent...");

    let config = EdgeConfig::load(config_path_from_args()?).context("loading edge config")?;
    let controller_interval = config.controller_interval();
    let bind_addr = config.local_api.bind_addr.clone();

    let (client, transitions) = EdgeSyncClient::builder(config).build().await?;
    let client = Arc::new(client);

    // Bind before starting anything so a busy port fails startup
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding local API on {bind_addr}"))?;
    info!(addr = %listener.local_addr()?, "Local API listening");

    let mut supervisor = ProcessSupervisor::new();
    client.register_tasks(&mut supervisor);

    let controller_client = client.clone();
    let controller = Arc::new(DryRunController::new());
    supervisor.add("access-controller", move |cancel| {
        run_controller(
            controller_client,
            controller,
            transitions,
            controller_interval,
            cancel,
        )
    });

    let app = build_router(client.clone());
    supervisor.add("local-api", move |cancel| async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        Ok::<(), EngineError>(())
    });

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    supervisor.run_or_exit(shutdown).await;

    info!("Edge agent shutdown complete");
    Ok(())
}

/// `--config <path>` or `--config=<path>`.
fn config_path_from_args() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args.next().context("--config needs a path")?;
            return Ok(Some(PathBuf::from(path)));
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Ok(Some(PathBuf::from(path)));
        }
        anyhow::bail!("unknown argument: {arg}");
    }
    Ok(None)
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
