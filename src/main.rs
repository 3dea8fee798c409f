use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use mdspace::app::{build_router, AppState};
use mdspace::config::{AppConfig, StoreBackend};
use mdspace::store::memory::MemoryRecordStore;
use mdspace::store::redis_store::RedisRecordStore;
use mdspace::store::RecordStore;

/// Ephemeral markdown sharing server.
#[derive(Debug, Parser)]
#[command(name = "mdspace", version)]
struct Cli {
    /// Optional configuration file (TOML, YAML or JSON), overridden by environment variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the in-process store instead of Redis.
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mdspace=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.memory {
        config.store_backend = StoreBackend::Memory;
    }

    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Redis => {
            let redis = RedisRecordStore::connect(&config.redis_url, config.store_timeout())
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Connected to Redis at {}", config.redis_url);
            Arc::new(redis)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; documents will not survive a restart");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let state = AppState::new(store.clone(), &config);
    let app = build_router(state, &config.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("mdspace listening on http://{}", addr);
    tracing::info!("Base URL: {}", config.base_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    drop(store);
    tracing::info!("Record store released, shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
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
                tracing::error!("Failed to listen for SIGTERM: {e}");
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
    tracing::info!("Shutdown signal received");
}
