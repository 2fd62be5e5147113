// Ferropool coordinator - distributes the nonce search space across workers
// and submits solved blocks to the node
use tokio::sync::mpsc;
use tracing::{error, info};

mod block;
mod config;
mod hub;
mod monitor;
mod notify;
mod rpc;
mod server;

use config::CoordinatorConfig;
use hub::Hub;
use monitor::TipMonitor;
use notify::Notifier;
use rpc::NodeClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = CoordinatorConfig::from_env()?;
    info!("🚀 starting mining coordinator");
    info!("node rpc endpoint: {}", config.rpc_url);
    info!("coinbase address: {}", config.miner_address);
    if config.telegram.is_none() {
        info!("operator notifications disabled");
    }

    let node = NodeClient::new(&config);
    let notifier = Notifier::new(config.telegram.clone());

    let (hub_tx, hub_rx) = mpsc::unbounded_channel();

    tokio::spawn(Hub::new(node.clone(), notifier).run(hub_rx));
    tokio::spawn(TipMonitor::new(node, config.miner_address.clone(), hub_tx.clone()).run());

    let listener_events = hub_tx;
    tokio::spawn(async move {
        if let Err(e) = server::run_listener(listener_events).await {
            error!("listener failed: {}", e);
        }
    });

    shutdown_signal().await;
    info!("🛑 shutdown signal received, stopping coordinator");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            // Fall back to SIGINT only.
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
