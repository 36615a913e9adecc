use anyhow::{Context, Result};
use clap::Parser;
use infrastructure::ServiceConfig;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use telemetry_service::{Adapters, Role, TelemetryService};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding default.toml and run-mode overrides
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Which half of the pipeline to run
    #[arg(long, value_enum, default_value_t = Role::All)]
    role: Role,

    /// Equipment document directory (overrides simulator.equipment_dir)
    #[arg(long)]
    equipment_dir: Option<String>,

    /// Health API bind address (overrides health.bind)
    #[arg(long)]
    bind: Option<String>,

    /// RNG seed for reproducible runs (overrides simulator.seed)
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,telemetry_service=debug,application=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("🏭 Telemetry service starting...");

    let mut config = ServiceConfig::load(&args.config_dir)
        .with_context(|| format!("failed to load configuration from '{}'", args.config_dir))?;
    if let Some(dir) = args.equipment_dir {
        config.simulator.equipment_dir = dir;
    }
    if let Some(bind) = args.bind {
        config.health.bind = bind;
    }
    if args.seed.is_some() {
        config.simulator.seed = args.seed;
    }

    let adapters = Adapters::from_config(&config).context("failed to set up adapters")?;
    let service = TelemetryService::start(config.clone(), args.role, adapters).await?;

    let listener = tokio::net::TcpListener::bind(&config.health.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.health.bind))?;
    info!("🚀 Health API listening on http://{}", config.health.bind);

    axum::serve(listener, service.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown signal received");
}
