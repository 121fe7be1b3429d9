use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ollqd_server::{AppState, Config, build_router};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "ollqd-server")]
#[command(about = "Task orchestration and streaming gateway for the ollqd worker")]
struct ServeArgs {
    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server port (overrides config and SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config and SERVER_HOST)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServeArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "ollqd_server=info,ollqd_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config =
        Config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    info!(
        worker = %config.worker.url,
        ollama = %config.ollama.url,
        max_finished = config.tasks.max_finished,
        "configuration loaded"
    );

    let addr = config.listen_addr();
    let state = AppState::from_config(config)?;
    let router = build_router(state.clone());

    info!("Starting ollqd gateway on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    state.shutdown();
}
