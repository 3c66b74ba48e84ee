//! # MediaHive Server
//!
//! Browses configured library directories over HTTP, streams files with
//! byte-range support, unpacks comic archives on demand and transcodes
//! videos the browser cannot play.

use anyhow::Context;
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediahive_config::{ConfigLoader, ConfigLoaderOptions};
use mediahive_core::MediaLibrary;
use mediahive_server::{AppState, create_app, infra::middleware::ApiTokens};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "mediahive-server")]
#[command(about = "Media library server with archive browsing and on-demand transcoding")]
struct Cli {
    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Path to a mediahive.toml configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let load = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config.clone(),
        env_file: cli.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")?;
    let mut config = load.config;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = config.metadata.config_path.as_ref() {
        info!(path = %path.display(), "loaded configuration file");
    }
    load.warnings.log();

    let roots = config.library_roots();
    for root in roots.all() {
        info!(id = %root.id, path = %root.path.display(), "library root");
    }
    let public = roots.public_ids();
    if !public.is_empty() {
        info!(ids = ?public, "public library roots");
    }

    let settings = config.cache_settings();
    let cleanup_interval = settings.cleanup_interval;
    let library = MediaLibrary::new(roots, settings, Arc::new(config.tool_runner()));
    library
        .prepare()
        .await
        .context("failed to create cache directories")?;

    let janitor = Arc::new(library.janitor());
    let janitor_task = janitor.spawn(cleanup_interval);

    let state = AppState::new(library, ApiTokens::new(&config.auth.api_tokens));
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Starting MediaHive server on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    janitor_task.abort();
    info!("MediaHive server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
