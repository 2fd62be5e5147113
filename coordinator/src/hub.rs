// Worker registry and event dispatch
//
// All mutation of the worker set and the candidate block happens on this
// single event-loop task, so neither needs a lock. Connection tasks and the
// tip monitor communicate with it exclusively through the event channel.
use std::collections::HashMap;
use std::time::Instant;

use ferropool_core::{FoundResult, NonceRange};
use ferropool_protocol::{encode, Event};
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::block::CandidateBlock;
use crate::notify::Notifier;
use crate::rpc::NodeClient;

pub type WorkerId = u64;

#[derive(Debug)]
pub enum HubEvent {
    /// A worker stream was accepted; frames for it go through `outbound`.
    Connected {
        id: WorkerId,
        outbound: UnboundedSender<String>,
    },

    /// A worker stream ended.
    Disconnected { id: WorkerId },

    /// A decoded frame arrived from a worker.
    Inbound { id: WorkerId, event: Event },

    /// The tip monitor rebuilt the candidate block.
    NewTemplate { candidate: CandidateBlock },
}

struct WorkerSession {
    outbound: UnboundedSender<String>,
    range: Option<NonceRange>,
    last_seen: Instant,
}

pub struct Hub {
    workers: HashMap<WorkerId, WorkerSession>,
    candidate: Option<CandidateBlock>,
    node: NodeClient,
    notifier: Notifier,
}

impl Hub {
    pub fn new(node: NodeClient, notifier: Notifier) -> Self {
        Self {
            workers: HashMap::new(),
            candidate: None,
            node,
            notifier,
        }
    }

    pub async fn run(mut self, mut events: UnboundedReceiver<HubEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
    }

    async fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected { id, outbound } => {
                self.workers.insert(
                    id,
                    WorkerSession {
                        outbound,
                        range: None,
                        last_seen: Instant::now(),
                    },
                );
                info!("🤝 worker {} connected (total: {})", id, self.workers.len());

                // Ranges go out before the template so no worker ever starts
                // a search without an assignment.
                self.rebalance();
                if let Some(template) = self.candidate.as_ref().map(|c| c.mining_template()) {
                    self.send_to(id, &Event::HeightChanged(template));
                }
            }

            HubEvent::Disconnected { id } => {
                if let Some(session) = self.workers.remove(&id) {
                    let range = session
                        .range
                        .map(|r| format!("[{}, {})", r.start, r.end))
                        .unwrap_or_else(|| "unassigned".into());
                    info!(
                        "👋 worker {} disconnected, range {} released, last seen {:.0?} ago (total: {})",
                        id,
                        range,
                        session.last_seen.elapsed(),
                        self.workers.len()
                    );
                }
                self.rebalance();
            }

            HubEvent::Inbound { id, event } => {
                if let Some(session) = self.workers.get_mut(&id) {
                    session.last_seen = Instant::now();
                }
                match event {
                    Event::NonceFound(found) => self.handle_nonce_found(id, found).await,
                    Event::Ping(payload) => {
                        self.send_to(id, &Event::Ping(ping_back(&payload)));
                    }
                    Event::IterationCompleted(iteration) => {
                        // Reserved: workers report exhausted sweeps, nothing
                        // reacts to them yet.
                        debug!("worker {} completed iteration {}", id, iteration);
                    }
                    other => warn!("ignoring unexpected {} from worker {}", other.name(), id),
                }
            }

            HubEvent::NewTemplate { candidate } => {
                let template = candidate.mining_template();
                self.candidate = Some(candidate);
                info!(
                    "⛏️  dispatching new mining template to {} worker(s)",
                    self.workers.len()
                );
                self.rebalance();
                self.broadcast(&Event::HeightChanged(template));
            }
        }
    }

    /// Repartition `[0, 2^32)` over the connected workers and push each its
    /// share. Called on every membership change and on every new template.
    fn rebalance(&mut self) {
        let count = self.workers.len();
        if count == 0 {
            return;
        }

        let ranges = NonceRange::FULL.split(count);
        for ((id, session), range) in self.workers.iter_mut().zip(ranges) {
            session.range = Some(range);
            match encode(&Event::RangeAssignment(range)) {
                Ok(text) => {
                    if session.outbound.send(text).is_ok() {
                        info!("assigned [{}, {}) to worker {}", range.start, range.end, id);
                    }
                }
                Err(e) => error!("failed to encode range assignment: {}", e),
            }
        }
    }

    async fn handle_nonce_found(&mut self, id: WorkerId, found: FoundResult) {
        info!(
            "worker {} reports nonce {} at timestamp {}",
            id, found.nonce, found.timestamp
        );

        let Some(candidate) = self.candidate.as_mut() else {
            warn!("nonce received but no candidate block is current; discarding");
            return;
        };

        candidate.apply_result(&found);
        if !candidate.is_valid() {
            warn!(
                "nonce {} from worker {} does not satisfy the target; discarding",
                found.nonce, id
            );
            return;
        }

        let hash = candidate.block_hash();
        let height = candidate.height;
        let serialized = candidate.serialize_hex();
        info!("✨ block {} at height {} is valid; submitting", hash, height);

        match self.node.submit_block(&serialized).await {
            Ok(result) if result.is_null() => {
                info!("block {} accepted by the node", hash);
                self.notifier
                    .send(&format!(
                        "Block Mined\nBlock Height: {}\nBlock Hash: {}",
                        height, hash
                    ))
                    .await;
            }
            Ok(result) => {
                warn!("node rejected block {}: {}", hash, result);
                self.notifier
                    .send(&format!("Error submitting block: {}", result))
                    .await;
            }
            Err(e) => {
                error!("failed to submit block {}: {}", hash, e);
                self.notifier
                    .send(&format!("Error submitting block: {}", e))
                    .await;
            }
        }
    }

    fn send_to(&self, id: WorkerId, event: &Event) {
        let Some(session) = self.workers.get(&id) else {
            return;
        };
        match encode(event) {
            Ok(text) => {
                let _ = session.outbound.send(text);
            }
            Err(e) => error!("failed to encode {} frame: {}", event.name(), e),
        }
    }

    fn broadcast(&self, event: &Event) {
        match encode(event) {
            Ok(text) => {
                for session in self.workers.values() {
                    let _ = session.outbound.send(text.clone());
                }
            }
            Err(e) => error!("failed to encode {} frame: {}", event.name(), e),
        }
    }
}

fn ping_back(payload: &Value) -> Value {
    let text = match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Value::String(format!("Ping back: {}", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::build_candidate;
    use crate::config::CoordinatorConfig;
    use crate::rpc::BlockTemplate;
    use serde_json::json;
    use tokio::sync::mpsc;

    const MINER_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

    fn test_hub() -> Hub {
        let config = CoordinatorConfig {
            rpc_url: "http://127.0.0.1:1".into(),
            rpc_user: "user".into(),
            rpc_pass: "pass".into(),
            miner_address: MINER_ADDRESS.into(),
            telegram: None,
        };
        Hub::new(NodeClient::new(&config), Notifier::new(None))
    }

    fn candidate_fixture() -> CandidateBlock {
        let template = BlockTemplate {
            version: 0x2000_0000,
            previousblockhash:
                "0000000000000000000000000000000000000000000000000000000000000000".into(),
            transactions: vec![],
            coinbasevalue: 5_000_000_000,
            curtime: 1_700_000_000,
            bits: "1d00ffff".into(),
            height: 1,
        };
        build_candidate(&template, MINER_ADDRESS).unwrap()
    }

    async fn connect(hub: &mut Hub, id: WorkerId) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.handle(HubEvent::Connected { id, outbound: tx }).await;
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(text) = rx.try_recv() {
            events.push(ferropool_protocol::decode(&text).unwrap());
        }
        events
    }

    fn last_range(events: &[Event]) -> NonceRange {
        events
            .iter()
            .rev()
            .find_map(|event| match event {
                Event::RangeAssignment(range) => Some(*range),
                _ => None,
            })
            .expect("no range assignment received")
    }

    #[tokio::test]
    async fn test_first_connect_without_template() {
        let mut hub = test_hub();
        let mut rx = connect(&mut hub, 1).await;

        // Only a range; no template exists yet.
        let events = drain(&mut rx);
        assert_eq!(events, vec![Event::RangeAssignment(NonceRange::FULL)]);
    }

    #[tokio::test]
    async fn test_template_dispatch_ordering() {
        let mut hub = test_hub();
        let mut a = connect(&mut hub, 1).await;
        let mut b = connect(&mut hub, 2).await;
        drain(&mut a);
        drain(&mut b);

        hub.handle(HubEvent::NewTemplate {
            candidate: candidate_fixture(),
        })
        .await;

        for rx in [&mut a, &mut b] {
            let events = drain(rx);
            assert_eq!(events.len(), 2);
            assert!(matches!(events[0], Event::RangeAssignment(_)));
            assert!(matches!(events[1], Event::HeightChanged(_)));
        }
    }

    #[tokio::test]
    async fn test_fresh_connect_receives_range_then_template() {
        let mut hub = test_hub();
        hub.handle(HubEvent::NewTemplate {
            candidate: candidate_fixture(),
        })
        .await;

        let mut rx = connect(&mut hub, 1).await;
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::RangeAssignment(_)));
        assert!(matches!(events[1], Event::HeightChanged(_)));
    }

    #[tokio::test]
    async fn test_join_rebalances_to_three_way_partition() {
        let mut hub = test_hub();
        let mut a = connect(&mut hub, 1).await;
        let mut b = connect(&mut hub, 2).await;
        let mut c = connect(&mut hub, 3).await;

        let mut ranges = vec![
            last_range(&drain(&mut a)),
            last_range(&drain(&mut b)),
            last_range(&drain(&mut c)),
        ];
        ranges.sort_by_key(|range| range.start);

        assert_eq!(ranges[0], NonceRange::new(0, 1431655765));
        assert_eq!(ranges[1], NonceRange::new(1431655765, 2863311530));
        assert_eq!(ranges[2], NonceRange::new(2863311530, 4294967296));
    }

    #[tokio::test]
    async fn test_disconnect_rebalances_remaining_workers() {
        let mut hub = test_hub();
        let mut a = connect(&mut hub, 1).await;
        let mut b = connect(&mut hub, 2).await;
        let mut c = connect(&mut hub, 3).await;
        drain(&mut a);
        drain(&mut b);
        drain(&mut c);

        hub.handle(HubEvent::Disconnected { id: 2 }).await;

        let mut ranges = vec![last_range(&drain(&mut a)), last_range(&drain(&mut c))];
        ranges.sort_by_key(|range| range.start);

        assert_eq!(ranges[0], NonceRange::new(0, 2147483648));
        assert_eq!(ranges[1], NonceRange::new(2147483648, 4294967296));
    }

    #[tokio::test]
    async fn test_ping_is_echoed() {
        let mut hub = test_hub();
        let mut rx = connect(&mut hub, 1).await;
        drain(&mut rx);

        hub.handle(HubEvent::Inbound {
            id: 1,
            event: Event::Ping(json!(1)),
        })
        .await;

        let events = drain(&mut rx);
        assert_eq!(events, vec![Event::Ping(json!("Ping back: 1"))]);
    }

    #[tokio::test]
    async fn test_invalid_nonce_is_discarded() {
        let mut hub = test_hub();
        let mut rx = connect(&mut hub, 1).await;
        hub.handle(HubEvent::NewTemplate {
            candidate: candidate_fixture(),
        })
        .await;
        drain(&mut rx);

        // Nonce 0 cannot satisfy mainnet-difficulty bits; the hub must log
        // and drop it without touching the node.
        hub.handle(HubEvent::Inbound {
            id: 1,
            event: Event::NonceFound(FoundResult {
                nonce: 0,
                timestamp: 1_700_000_000,
            }),
        })
        .await;

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_nonce_without_candidate_is_ignored() {
        let mut hub = test_hub();
        hub.handle(HubEvent::Inbound {
            id: 7,
            event: Event::NonceFound(FoundResult {
                nonce: 1,
                timestamp: 2,
            }),
        })
        .await;
    }
}
