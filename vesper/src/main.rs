use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vesper_core::config::Config;
use vesper_core::task_watcher::TaskWatcher;
use vesper_core::vim::session::VimConnector;
use vesper_vim::VimHttpConnector;

use vesper::api;
use vesper::api::rest::AppState;

#[derive(Parser, Debug)]
#[command(name = "vesper", about = "vSphere provisioning control plane", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "vesper.toml")]
    config: PathBuf,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vesper=info,vesper_core=info,vesper_vim=info,tower_http=warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        info!(
            "no config file at {}; using defaults and environment",
            cli.config.display()
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    config.validate().context("invalid configuration")?;

    let connector: Arc<dyn VimConnector> = Arc::new(VimHttpConnector::new());
    let watcher = Arc::new(TaskWatcher::new(
        connector.clone(),
        config.endpoint.clone(),
        config.watcher.clone(),
    ));
    let state = AppState::new(connector, Arc::new(config.clone()), watcher.clone());
    let app = api::server::build_router(state, &config.server);

    let listener = tokio::net::TcpListener::bind(config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    info!(
        "vesper listening on {} (endpoint {})",
        config.server.bind_address,
        config.endpoint.display_name()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    watcher.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    info!("shutdown requested");
}
