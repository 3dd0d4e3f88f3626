//! NLWeb server binary: env config, tracing, graceful shutdown.
//!
//! Backends are registered by the embedding application; run standalone the
//! server starts with an empty registry and reports not-ready until one is
//! wired in.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nlweb::backends::{BackendManager, BackendRegistry};
use nlweb::{NLWebConfig, QueryService};
use nlweb_serve::AppState;

#[derive(Parser)]
#[command(name = "nlweb-server", about = "NLWeb query server")]
struct Args {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid bind address")?;

    let config = Arc::new(NLWebConfig::from_env());
    config.validate().context("invalid configuration")?;

    let registry = BackendRegistry::new();
    if config.multi_backend.endpoints.is_empty() {
        tracing::warn!(
            "No backend endpoints configured; /ask will answer 502 until a backend is registered"
        );
    }
    let manager = BackendManager::new(registry, config.multi_backend.clone());
    let service = Arc::new(QueryService::new(config, manager, None)?);

    nlweb_serve::serve(addr, AppState::new(service))
        .await
        .context("server error")?;
    Ok(())
}
