//! spx - Entry Point
//!
//! Starts the proxy server with graceful shutdown support.

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spx::cli::Cli;
use spx::config::{Config, LogConfig};
use spx::error::{Result, SpxError};
use spx::proxy::ProxyServer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", Cli::version_line());
        return Ok(());
    }

    // Load configuration
    let (config_path, explicit) = cli.config_path();
    let loaded = Config::from_file(&config_path)?;
    if loaded.is_none() && explicit {
        return Err(SpxError::InvalidConfig(format!(
            "config file {} not found",
            config_path.display()
        )));
    }
    let found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    config.apply_overrides(cli.port);

    init_tracing(&config.log);

    info!("Starting spx {}", env!("CARGO_PKG_VERSION"));
    if found {
        info!("Configuration loaded from {}", config_path.display());
    } else {
        info!("config file not found, using default config and args");
    }

    let proxy_server = ProxyServer::new(&config)?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut proxy_task = tokio::spawn(async move {
        if let Err(e) = proxy_server.run(shutdown_rx).await {
            error!("Proxy server error: {}", e);
        }
    });

    info!("Server started - Proxy: {}", config.proxy_addr());

    // Wait for shutdown signal, or for the server to stop on its own
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        _ = &mut proxy_task => {
            return Err(SpxError::Internal("proxy server stopped unexpectedly".into()));
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = proxy_task.await;

    info!("spx stopped");
    Ok(())
}

/// Initialize tracing from `RUST_LOG`, falling back to the configured level
fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("spx={}", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
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
}
