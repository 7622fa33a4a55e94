//! Quill API server binary.
//!
//! Usage:
//!   quill --config quill.toml
//!   quill --port 8080 --bind 0.0.0.0
//!   quill --no-retrieval
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` - key for completions and embeddings
//! - `QDRANT_URL`, `QDRANT_API_KEY` - vector store location and key
//! - `QUILL_USERNAME`, `QUILL_PASSWORD` - login credentials
//! - `QUILL_BIND_ADDR` - bind address (default: 127.0.0.1)

use clap::Parser;
use quill_api::{AppConfig, AppState, serve};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "quill", version, about = "Persona chat, journal companion and news server")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "QUILL_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides QUILL_BIND_ADDR and the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run without the embedding service and vector store
    #[arg(long)]
    no_retrieval: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quill_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            AppConfig::from_file(path)?
        }
        None => {
            tracing::info!("Using default configuration");
            AppConfig::default()
        }
    };
    config.apply_env();

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    if config.server.bind == "0.0.0.0" {
        tracing::warn!(
            "Server binding to 0.0.0.0. This exposes the API to all network interfaces; \
             make sure strong login credentials are set."
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = AppState::from_config(config, !cli.no_retrieval).await?;

    serve(Arc::new(state), addr).await
}
