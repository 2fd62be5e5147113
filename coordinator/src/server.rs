// WebSocket listener and per-worker stream tasks
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use ferropool_protocol::CodecError;

use crate::hub::{HubEvent, WorkerId};

/// Service address workers connect to.
pub const LISTEN_ADDR: &str = "0.0.0.0:8765";

/// Accept worker streams forever, handing each to its own session task.
pub async fn run_listener(events: UnboundedSender<HubEvent>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(LISTEN_ADDR).await?;
    info!("🌐 listening for workers on {}", LISTEN_ADDR);

    let mut next_id: WorkerId = 0;
    loop {
        let (stream, addr) = listener.accept().await?;
        next_id += 1;
        let id = next_id;
        debug!("accepted connection from {} as worker {}", addr, id);

        let events = events.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_worker(id, stream, events).await {
                debug!("worker {} session ended: {}", id, e);
            }
        });
    }
}

/// Drive one worker stream: a writer task drains the hub's outbound channel
/// into the sink, while this task decodes inbound frames and forwards them to
/// the hub. Either side failing tears the session down.
async fn serve_worker(
    id: WorkerId,
    stream: TcpStream,
    events: UnboundedSender<HubEvent>,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    events.send(HubEvent::Connected {
        id,
        outbound: outbound_tx,
    })?;

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = read.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                warn!("worker {} stream error: {}", id, e);
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match ferropool_protocol::decode(&text) {
            Ok(event) => events.send(HubEvent::Inbound { id, event })?,
            Err(CodecError::UnknownEvent(name)) => {
                warn!("worker {} sent unknown event `{}`; ignoring", id, name);
            }
            Err(e) => warn!("dropping malformed frame from worker {}: {}", id, e),
        }
    }

    events.send(HubEvent::Disconnected { id })?;
    writer.abort();
    Ok(())
}
