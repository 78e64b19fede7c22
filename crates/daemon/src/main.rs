use anyhow::{Context, Result};
use chatwatch_api_client::YouTubeClient;
use chatwatch_daemon::server::{self, AppState};
use chatwatch_daemon::{config, run_engine, Engine, EngineConfig, FanOut};
use chatwatch_local_store::SqliteStore;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chatwatch-daemon", version, about = "Monitor live-stream chat for owner and moderator messages")]
struct Cli {
    /// Config file (default: ~/.config/chatwatch/chatwatch.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Control surface address, overriding `[server] bind`
    #[arg(long)]
    bind: Option<String>,

    /// SQLite state file, overriding `[storage] path`
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chatwatch_daemon=info".parse().unwrap())
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("Daemon fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("chatwatch-daemon starting");

    let cfg = config::load_config(cli.config.as_deref())?;

    let db_path = config::resolve_db_path(&cfg, cli.db.as_deref())?;
    let store = Arc::new(
        SqliteStore::open_path(&db_path)
            .with_context(|| format!("Failed to open state database at {}", db_path.display()))?,
    );
    info!("State database opened: {}", db_path.display());

    let source = Arc::new(
        YouTubeClient::new(
            &cfg.upstream.base_url,
            Duration::from_secs(cfg.upstream.timeout_secs),
        )
        .context("Failed to build upstream client")?,
    );

    let fanout = FanOut::new(cfg.observer.event_buffer);
    let (engine, rx) = Engine::new(
        store,
        source,
        fanout.clone(),
        EngineConfig::from_watch_config(&cfg),
    );
    let handle = engine.handle();

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Serve before the engine resumes so a returning observer can re-attach
    let bind = cli.bind.unwrap_or_else(|| cfg.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind control surface at {bind}"))?;
    info!("Control surface listening at http://{bind}");
    let app = server::router(AppState {
        engine: handle,
        fanout,
    });
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Control surface stopped: {e}");
        }
    });

    let engine_handle = tokio::spawn(run_engine(engine, rx, shutdown_rx));

    // Wait for shutdown signal
    wait_for_shutdown().await;

    info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);

    // Let the engine flush before dropping connections
    let _ = engine_handle.await;
    server_handle.abort();

    info!("chatwatch-daemon stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to register Ctrl+C handler");
        info!("Received Ctrl+C");
    }
}
