//! nomad-notifier - Nomad event stream to Slack and Discord
//!
//! Loads configuration, installs logging and runs the application until
//! Ctrl-C or SIGTERM.

use anyhow::Result;
use clap::Parser;
use nomad_notifier::{app::App, cli::Cli, config::Config};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            init_tracing("info");
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "nomad-notifier starting up...");

    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Nomad Address: {}", config.nomad.address);
    info!("Nomad UI Address: {}", config.nomad.ui_base());
    info!(
        "Nomad Token: {}",
        if config.nomad.token.is_some() { "Set" } else { "Not set" }
    );
    info!("Allocation Max Age: {}s", config.allocations.max_age_seconds);
    match config.metrics_address {
        Some(addr) => info!("Metrics Address: {}", addr),
        None => info!("Metrics Address: Disabled"),
    }
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = match App::builder(config).build(shutdown_rx).await {
        Ok(app) => app,
        Err(err) => {
            error!("Failed to start: {:#}", err);
            std::process::exit(1);
        }
    };

    let mut run = tokio::spawn(app.run());

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received. Shutting down gracefully...");
            None
        }
        _ = terminate() => {
            info!("SIGTERM received. Shutting down gracefully...");
            None
        }
        result = &mut run => Some(result),
    };

    let result = match result {
        Some(result) => result,
        None => {
            let _ = shutdown_tx.send(true);
            run.await
        }
    };

    match result {
        Ok(Ok(())) => {
            info!("Exiting.");
            Ok(())
        }
        Ok(Err(err)) => {
            error!("{:#}", err);
            std::process::exit(1);
        }
        Err(err) => {
            error!("Application task panicked: {:?}", err);
            std::process::exit(1);
        }
    }
}
