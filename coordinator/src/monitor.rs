// Chain tip monitor
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use crate::block;
use crate::hub::HubEvent;
use crate::rpc::NodeClient;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls the node for the chain height and rebuilds the candidate block
/// whenever the tip advances.
pub struct TipMonitor {
    node: NodeClient,
    miner_address: String,
    events: UnboundedSender<HubEvent>,
    current_height: Option<u64>,
}

impl TipMonitor {
    pub fn new(node: NodeClient, miner_address: String, events: UnboundedSender<HubEvent>) -> Self {
        Self {
            node,
            miner_address,
            events,
            current_height: None,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll().await {
                error!("tip poll failed: {:#}", e);
            }
        }
    }

    /// The cached height only advances after the whole pipeline succeeds, so
    /// any failure is retried on the next tick.
    async fn poll(&mut self) -> anyhow::Result<()> {
        let info = self.node.get_blockchain_info().await?;
        if self.current_height == Some(info.blocks) {
            return Ok(());
        }

        info!("⛓️  chain tip moved to height {}", info.blocks);
        let template = self.node.get_block_template().await?;
        let candidate = block::build_candidate(&template, &self.miner_address)?;
        self.events.send(HubEvent::NewTemplate { candidate })?;

        self.current_height = Some(info.blocks);
        Ok(())
    }
}
