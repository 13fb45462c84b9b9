use anyhow::{Context, Result};
use axum::serve;
use coin_clicker::bonus::scheduler::{BonusScheduler, DelayRange};
use coin_clicker::core::compaction::CompactionTask;
use coin_clicker::core::config::Config;
use coin_clicker::core::routes::build_router;
use coin_clicker::core::startup::restore_users;
use coin_clicker::core::state::AppState;
use coin_clicker::core::tracing_init::init_tracing;
use coin_clicker::wal::wal::Wal;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // Load and validate configuration
    let config = Config::from_file(&config_path)
        .context(format!(
            "Failed to load configuration from '{}'. \
            If this is your first time running the server, copy config.example.toml to config.toml and adjust the values.",
            config_path.display()
        ))?;

    init_tracing(&config.logging)?;

    // Build Tokio runtime with configured number of threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        port = config.server.port,
        num_threads = config.server.num_threads,
        data_path = %config.storage.data_path.display(),
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        "Coin clicker server starting"
    );

    let wal = Wal::new(config.storage.data_path.clone())
        .context("Failed to initialize WAL")?;

    let state = Arc::new(AppState::new(config.clone(), wal));

    restore_users(&state)?;

    let scheduler = BonusScheduler::spawn(
        Arc::clone(&state.bonus),
        DelayRange::from_config(&config.bonus),
    );

    info!(
        min_delay_seconds = config.bonus.min_delay_secs,
        max_delay_seconds = config.bonus.max_delay_secs,
        duration_seconds = config.bonus.duration_secs,
        "Bonus scheduler started"
    );

    let compaction = CompactionTask::spawn(
        Arc::clone(&state),
        Duration::from_secs(config.storage.compaction_interval_secs),
    );

    let app = build_router(Arc::clone(&state)).layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        ),
    );

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind TCP listener to {}", addr))?;

    info!(address = %addr, users = state.users.len(), "Coin clicker server listening");

    let served = serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error");

    // Cancel pending bonus timers before the runtime goes away
    scheduler.shutdown().await;
    compaction.shutdown().await;

    info!("Shutting down gracefully");

    served
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
