//! Gitgate - git smart HTTP server.

use anyhow::Context;
use clap::Parser;
use gitgate_auth::ServicePolicy;
use gitgate_server::{
    create_router, observability::init_logging, AppState, LogFormat, ServerConfig,
};
use gitgate_storage::FsRepoDirectory;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Gitgate - serve git repositories over HTTP
#[derive(Parser, Debug)]
#[command(name = "gitgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a configuration file (YAML or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Directory holding the repositories
    #[arg(long)]
    repositories_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(dir) = self.repositories_dir {
            config.repositories_dir = dir;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.json_logs {
            config.log_format = LogFormat::Json;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    init_logging(&config.log_level, config.log_format);

    let version = env!("CARGO_PKG_VERSION");
    tracing::info!(version, "Starting Gitgate");

    std::fs::create_dir_all(&config.repositories_dir).with_context(|| {
        format!(
            "Failed to create repositories directory {}",
            config.repositories_dir.display()
        )
    })?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        repositories_dir = %config.repositories_dir.display(),
        upload_pack = config.access.upload_pack,
        receive_pack = config.access.receive_pack,
        default_permission = %config.access.default_permission,
        "Server configuration"
    );

    let state = AppState::new(
        Arc::new(FsRepoDirectory::new(&config.repositories_dir)),
        Arc::new(ServicePolicy::from_config(&config.access)),
        version,
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!("Gitgate listening on {}", config.listen_addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gitgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
