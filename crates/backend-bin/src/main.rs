use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use identity_backend::{config::Settings, routes, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Username availability and password service
#[derive(Debug, Parser)]
#[command(name = "identity-server", version)]
struct Args {
    /// TOML config file; environment variables prefixed `IDENTITY_` override it
    #[arg(short, long, default_value = identity_backend::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override `server.bind_addr`
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load_from(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        settings.server.bind_addr = bind;
    }

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bind_addr = settings.server.bind_addr;
    let refresh_interval = settings.bloom.refresh_interval();
    let state = AppState::from_settings(settings)?;

    // Until a rebuild succeeds, checks may report taken names as available;
    // registration still consults the store.
    match state.availability.rebuild_filter().await {
        Ok(loaded) => info!(loaded, "initial username filter built"),
        Err(e) => warn!(error = %e, "initial username filter build failed"),
    }
    let _refresh = state.availability.spawn_refresh_task(refresh_interval);

    let app = routes::create_router(state);
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(%bind_addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
