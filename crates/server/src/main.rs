use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use ferry_engine::{BackgroundProcessorBuilder, SweepOptions};
use ferry_server::api::{AppState, router};
use ferry_server::config::FerryConfig;
use ferry_server::report::{ReportFormat, render};
use ferry_server::services::Services;
use ferry_server::store_factory::{StoreSetup, create_metadata_store};
use ferry_server::telemetry::{self, LogTarget};

/// Ferry ephemeral file sharing server.
#[derive(Parser, Debug)]
#[command(name = "ferry-server", about = "Ephemeral single-download file sharing")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "ferry.toml")]
    config: PathBuf,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API (the default).
    Serve,
    /// Run metadata backend migrations, then exit.
    Migrate,
    /// Run one cleanup sweep, print a report, then exit.
    Cleanup {
        /// Show what would be deleted without deleting anything.
        #[arg(long)]
        dry_run: bool,
        /// Reclaim every downloaded file, ignoring its retention window.
        #[arg(long)]
        force: bool,
        /// Report format.
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_target = match cli.command {
        Some(Commands::Cleanup { .. }) => LogTarget::Stderr,
        _ => LogTarget::Stdout,
    };
    telemetry::init(log_target);

    let (config, found) = FerryConfig::load(&cli.config)?;
    if !found {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Some(Commands::Migrate) => run_migrate(&config).await,
        Some(Commands::Cleanup {
            dry_run,
            force,
            format,
        }) => run_cleanup(&config, dry_run, force, format).await,
        Some(Commands::Serve) | None => run_serve(config, cli.host, cli.port).await,
    }
}

async fn run_serve(
    config: FerryConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::from_config(&config).await?;

    let (mut processor, background_shutdown_tx) = BackgroundProcessorBuilder::new()
        .config(config.cleanup.background())
        .sweeper(Arc::clone(&services.sweeper))
        .build()?;
    let background = tokio::spawn(async move { processor.run().await });

    let app = router(AppState::new(services.clone()));

    // CLI overrides take precedence.
    let host = host.unwrap_or(config.server.host);
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "ferry-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = background_shutdown_tx.send(()).await;
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let drain = async {
        let _ = background.await;
        services.inline.shutdown().await;
    };
    if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
        warn!(
            timeout_secs = config.server.shutdown_timeout_seconds,
            "shutdown timeout exceeded, abandoning in-flight cleanup"
        );
    }

    info!("ferry-server shut down");
    Ok(())
}

/// Run the `migrate` subcommand: prepare the metadata backend and exit.
async fn run_migrate(config: &FerryConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(backend = %config.metadata.backend, "running metadata migrations...");
    let _store = create_metadata_store(&config.metadata, StoreSetup::Prepare).await?;
    info!(backend = %config.metadata.backend, "metadata migrations complete");
    Ok(())
}

/// Run the `cleanup` subcommand.
///
/// Per-item failures are reported but do not fail the command; only an
/// aborted sweep does.
async fn run_cleanup(
    config: &FerryConfig,
    dry_run: bool,
    force: bool,
    format: ReportFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    // A preview leaves storage exactly as it found it.
    let setup = if dry_run {
        StoreSetup::Untouched
    } else {
        StoreSetup::Prepare
    };
    let services = Services::open(config, setup).await?;
    let report = services
        .sweeper
        .run(SweepOptions::manual(dry_run, force))
        .await?;
    println!("{}", render(&report, format)?);
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
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
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
