//! Posting sweep worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tokpipe_worker::bootstrap::orchestrator_from_env;
use tokpipe_worker::{SweepExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("tokpipe=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting tokpipe-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let orchestrator = match orchestrator_from_env(&config) {
        Ok(o) => Arc::new(o),
        Err(e) => {
            error!("Failed to build pipeline: {:#}", e);
            std::process::exit(1);
        }
    };

    let executor = SweepExecutor::new(config.clone(), orchestrator);
    let shutdown = executor.shutdown_handle();
    let mut handle = tokio::spawn(async move { executor.run().await });

    tokio::select! {
        result = &mut handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Executor error: {}", e);
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("Executor task panicked: {}", e);
                    std::process::exit(1);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown.send(true);
            if tokio::time::timeout(config.shutdown_timeout, handle).await.is_err() {
                error!("Sweep did not finish within {:?}", config.shutdown_timeout);
            }
        }
    }

    info!("Worker shutdown complete");
}
