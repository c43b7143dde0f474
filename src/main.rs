use anyhow::{Context, Result};
use clap::Parser;
use recordings_api::http::cors_layer;
use recordings_api::{
    create_router, AppState, Config, LocalDiskStorage, NatsClient, RecordingDb, RecordingStore,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recordings-api")]
#[command(about = "Recording and transcription management API")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/recordings-api")]
    config: String,

    /// Override the HTTP port from the config
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    let recordings_dir = cfg.recordings_dir();
    tokio::fs::create_dir_all(&recordings_dir)
        .await
        .with_context(|| format!("Failed to create {}", recordings_dir.display()))?;
    let recordings_dir = tokio::fs::canonicalize(&recordings_dir)
        .await
        .with_context(|| format!("Failed to resolve {}", recordings_dir.display()))?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Recordings directory: {}", recordings_dir.display());

    let db_path = cfg.database_path();
    let db = tokio::task::spawn_blocking(move || RecordingDb::open(&db_path)).await??;
    info!("Recording index: {}", cfg.database_path().display());

    let store = RecordingStore::open(
        db,
        Arc::new(LocalDiskStorage::new(recordings_dir)),
        cfg.audio_timeout(),
    )
    .await?;
    let state = AppState::new(store);

    // Held for the lifetime of the server so the listeners keep their connection
    let _nats = if cfg.nats.enabled {
        let nats = NatsClient::connect(&cfg.nats.url).await?;
        nats.spawn_listeners(state.store.clone(), state.tracker.clone())
            .await?;
        Some(nats)
    } else {
        warn!("NATS disabled; recordings can only be read and deleted");
        None
    };

    let app = create_router(state).layer(cors_layer(&cfg.cors.allowed_origins));

    let addr = cfg.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on http://{}/api", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
