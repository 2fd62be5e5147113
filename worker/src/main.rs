// Ferropool worker - hashes its assigned share of the nonce space
use tracing::{error, info};

mod config;
mod session;

use config::WorkerConfig;
use session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = WorkerConfig::from_env()?;
    info!("🚀 starting mining worker");
    info!("coordinator url: {}", config.server_url);

    let session = Session::new(config.server_url);
    tokio::select! {
        _ = session.run() => {}
        _ = shutdown_signal() => {
            info!("🛑 shutdown signal received, stopping worker");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
