//! MCP Gateway & Registry binary: wires the registry store, the core
//! service, the tool-group manager, and the HTTP surface together and
//! serves them with `axum::serve`, the way `op-web`'s `main.rs` wires up
//! its own `AppState` and server.

mod config;

use clap::Parser;
use config::GatewayConfig;
use gateway_core::telemetry::PrometheusSink;
use gateway_core::{McpService, TelemetrySink, ToolGroupManager};
use gateway_http::{AppState, GroupMcpCache};
use gateway_store::RegistryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// CLI flags covering only what's needed to locate the config and bind
/// address; everything else lives in the config file.
#[derive(Debug, Parser)]
#[command(name = "mcp-gateway", about = "MCP Gateway & Registry")]
struct Cli {
    /// Path to the YAML config file (defaults to `$MCP_GATEWAY_CONFIG` or ./mcp-gateway.yaml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the config file's bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = Cli::parse();
    let mut config = GatewayConfig::load_default(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    let store = Arc::new(RegistryStore::new(&config.database_url).await?);

    let metrics = Arc::new(prometheus::Registry::new());
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(PrometheusSink::new(&metrics)?);

    let service = McpService::new(store.clone(), telemetry);
    service.initialize().await?;

    let groups = ToolGroupManager::new(store.clone(), service.clone()).await?;
    let group_mcp = GroupMcpCache::new(groups.clone(), store.clone());

    let state = AppState { store, service, groups, metrics, group_mcp };
    let app = gateway_http::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, "mcp gateway listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("mcp gateway shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install signal handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}
