use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use vouch_server::policy::PolicyTier;
use vouch_server::{AppState, Config, router, spawn_session_cleanup, telemetry};

#[derive(Debug, Parser)]
#[command(name = "vouch", version, about = "Authorization edge service for reverse proxies")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    telemetry::init_tracing(&config)?;

    if cli.check_config {
        let addr = config.socket_addr();
        let provider = config.oauth.provider.clone();
        let tier = PolicyTier::select(&config.vouch);
        AppState::from_config(config)?;
        println!("configuration ok");
        println!("  listen:   {}", addr);
        println!("  provider: {}", provider);
        println!("  policy:   {:?}", tier);
        return Ok(());
    }

    let addr = config.socket_addr();
    let cleanup_every = Duration::from_secs(config.session.max_age_seconds.max(1));
    let state = AppState::from_config(config)?;
    spawn_session_cleanup(state.sessions.clone(), cleanup_every);

    let app = router(state);

    info!("vouch listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
