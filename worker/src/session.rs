// Worker session - one persistent stream to the coordinator
use std::time::Duration;

use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use ferropool_core::{FoundResult, MiningTemplate, NonceRange};
use ferropool_pow::{expand_compact, CancelFlag, HeaderPrefix, Searcher};
use ferropool_protocol::{encode, CodecError, Event};

const RECONNECT_DELAY: Duration = Duration::from_secs(10);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection manager: maintains the coordinator stream, tracks the assigned
/// range, and drives at most one mining job at a time.
pub struct Session {
    server_url: String,
    range: NonceRange,
    job: Option<JobHandle>,
}

struct JobHandle {
    cancel: CancelFlag,
    task: JoinHandle<()>,
}

impl Session {
    pub fn new(server_url: String) -> Self {
        Self {
            server_url,
            // Until the coordinator assigns a share, search everything.
            range: NonceRange::FULL,
            job: None,
        }
    }

    /// Connect, serve, reconnect; runs forever.
    pub async fn run(mut self) {
        loop {
            let ws = self.establish_connection().await;
            let (mut write, read) = ws.split();

            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
            let writer = tokio::spawn(async move {
                while let Some(text) = outbound_rx.recv().await {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });
            let keep_alive = tokio::spawn(keep_alive_loop(outbound_tx.clone()));

            self.receive_loop(read, &outbound_tx).await;

            // Stream lost: everything that depends on it goes too.
            keep_alive.abort();
            self.cancel_job().await;
            writer.abort();

            info!("reconnecting to the coordinator in {:?}", RECONNECT_DELAY);
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn establish_connection(&self) -> WsStream {
        loop {
            match connect_async(self.server_url.as_str()).await {
                Ok((ws, _)) => {
                    info!("connected to coordinator at {}", self.server_url);
                    return ws;
                }
                Err(e) => {
                    error!(
                        "connection attempt failed: {}; retrying in {:?}",
                        e, RECONNECT_DELAY
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn receive_loop(
        &mut self,
        mut read: SplitStream<WsStream>,
        outbound: &UnboundedSender<String>,
    ) {
        while let Some(message) = read.next().await {
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    warn!("stream error: {}", e);
                    return;
                }
            };
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => return,
                _ => continue,
            };

            match ferropool_protocol::decode(&text) {
                Ok(Event::RangeAssignment(range)) => {
                    // Stored only; the next height change picks it up. An
                    // in-flight job keeps its old range until superseded.
                    info!("range assignment: [{}, {})", range.start, range.end);
                    self.range = range;
                }
                Ok(Event::HeightChanged(template)) => {
                    self.start_job(template, outbound).await;
                }
                Ok(other) => debug!("discarding {} from coordinator", other.name()),
                Err(CodecError::UnknownEvent(name)) => {
                    warn!("unknown event `{}` from coordinator; ignoring", name);
                }
                Err(e) => warn!("dropping malformed frame: {}", e),
            }
        }
    }

    /// A height change supersedes the running job: cancel it, wait for it to
    /// wind down, then launch the new search. Two jobs never run at once.
    async fn start_job(&mut self, template: MiningTemplate, outbound: &UnboundedSender<String>) {
        self.cancel_job().await;

        info!(
            "new job: timestamp {}, bits 0x{:08x}, range [{}, {})",
            template.timestamp, template.bits_difficulty, self.range.start, self.range.end
        );
        let cancel = CancelFlag::new();
        let task = tokio::spawn(run_job(
            template,
            self.range,
            cancel.clone(),
            outbound.clone(),
        ));
        self.job = Some(JobHandle { cancel, task });
    }

    async fn cancel_job(&mut self) {
        if let Some(job) = self.job.take() {
            job.cancel.cancel();
            if let Err(e) = job.task.await {
                warn!("job task failed: {}", e);
            }
        }
    }
}

/// Search the assigned range for the given template. Whenever the range is
/// exhausted without a hit, bump the header timestamp by one and sweep again,
/// reporting the completed iteration. Ends on a hit, cancellation, or an
/// internal failure.
async fn run_job(
    mut template: MiningTemplate,
    range: NonceRange,
    cancel: CancelFlag,
    outbound: UnboundedSender<String>,
) {
    let target = match expand_compact(template.bits_difficulty) {
        Ok(target) => target,
        Err(e) => {
            error!("unusable template: {}", e);
            return;
        }
    };

    let mut iterations: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let prefix = HeaderPrefix::from_template(&template);
        let flag = cancel.clone();
        let result =
            tokio::task::spawn_blocking(move || Searcher::auto().search(&prefix, target, range, &flag))
                .await;

        match result {
            Ok(Some(nonce)) => {
                let found = FoundResult {
                    nonce,
                    timestamp: template.timestamp,
                };
                info!("💎 found nonce {} at timestamp {}", nonce, found.timestamp);
                send(&outbound, &Event::NonceFound(found));
                return;
            }
            Ok(None) => {
                if cancel.is_cancelled() {
                    return;
                }
                iterations += 1;
                template.timestamp = template.timestamp.wrapping_add(1);
                debug!("range exhausted; retrying with timestamp {}", template.timestamp);
                send(&outbound, &Event::IterationCompleted(json!(iterations)));
            }
            Err(e) => {
                error!("search task failed: {}", e);
                return;
            }
        }
    }
}

async fn keep_alive_loop(outbound: UnboundedSender<String>) {
    let mut ticker = tokio::time::interval(KEEP_ALIVE_INTERVAL);
    loop {
        ticker.tick().await;
        send(&outbound, &Event::Ping(json!(1)));
    }
}

fn send(outbound: &UnboundedSender<String>, event: &Event) {
    match encode(event) {
        Ok(text) => {
            if outbound.send(text).is_err() {
                debug!("outbound channel closed; dropping {}", event.name());
            }
        }
        Err(e) => error!("failed to encode {} frame: {}", event.name(), e),
    }
}
