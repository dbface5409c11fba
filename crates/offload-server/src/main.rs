#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use offload::{Dispatcher, WorkerPool};
use server::api::routes::{AppState, router};
use server::config::{CliArgs, ServerConfig};
use server::store::Store;
use server::telemetry::init_telemetry;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry()?;

    let pool = WorkerPool::new(config.pool.clone())?;
    let dispatcher = match config.handler_deadline {
        Some(deadline) => Dispatcher::new(pool.clone()).with_deadline(deadline),
        None => Dispatcher::new(pool.clone()),
    };
    let state = AppState::new(Store::new(config.store_latency), &dispatcher);

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests are done; drain whatever the pool still holds.
    let report = pool.shutdown().await?;
    if report.abandoned > 0 {
        tracing::warn!(
            "Worker pool stopped after {:?} with {} of {} workers abandoned",
            report.elapsed,
            report.abandoned,
            report.joined + report.abandoned
        );
    } else {
        tracing::info!(
            "Worker pool drained in {:?} ({} workers joined)",
            report.elapsed,
            report.joined
        );
    }
    if report.dropped > 0 {
        tracing::warn!("{} queued requests were dropped unrun", report.dropped);
    }

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting CRUD service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting CRUD service on {} with {} workers",
            config.server_addr,
            config.pool.num_workers
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
