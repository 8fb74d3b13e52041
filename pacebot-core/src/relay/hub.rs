//! src/relay/hub.rs
//!
//! Stateless broadcast broker. Every connection gets its own unbounded
//! send queue so one slow or stuck consumer never stalls fan-out to the
//! rest; a consumer whose socket dies is dropped from the registry and
//! must reconnect. Nothing is persisted and nothing is replayed: a hub
//! restart is invisible to clients beyond their reconnect window.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pacebot_common::models::relay::RelayEnvelope;

use crate::Error;

/// One registered subscriber: its free-form logging id and its private
/// send queue.
struct Subscriber {
    client_id: String,
    tx: mpsc::UnboundedSender<RelayEnvelope>,
}

/// Connection registry plus fan-out. Transport-agnostic so tests can
/// drive it with bare channels.
#[derive(Default)]
pub struct HubState {
    subscribers: DashMap<Uuid, Subscriber>,
}

impl HubState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client_id: &str) -> (Uuid, mpsc::UnboundedReceiver<RelayEnvelope>) {
        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(
            connection_id,
            Subscriber { client_id: client_id.to_string(), tx },
        );
        (connection_id, rx)
    }

    pub fn unregister(&self, connection_id: Uuid) {
        self.subscribers.remove(&connection_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Hands the envelope to every subscriber's queue except the producing
    /// connection; returns how many queues accepted it. A closed queue
    /// means the writer task is gone, so the entry is pruned on the spot.
    pub fn broadcast(&self, envelope: &RelayEnvelope, skip: Option<Uuid>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            if Some(*entry.key()) == skip {
                continue;
            }
            if entry.value().tx.send(envelope.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }
        for connection_id in dead {
            debug!("pruning dead subscriber {connection_id}");
            self.subscribers.remove(&connection_id);
        }
        delivered
    }
}

#[derive(Clone)]
pub struct RelayHub {
    state: Arc<HubState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RelayHub {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            state: Arc::new(HubState::new()),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn state(&self) -> Arc<HubState> {
        self.state.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Accept loop. Runs until `shutdown` is signaled; each connection
    /// gets a reader task (publishes) and a writer task (drains its own
    /// queue), so fan-out is never serialized behind one socket.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Error> {
        eprintln!("DBG: serve starting on {:?}", listener.local_addr());
        info!("relay hub listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let state = self.state.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(state, stream).await {
                                    debug!("connection from {peer} ended: {e}");
                                }
                            });
                        }
                        Err(e) => warn!("relay hub accept error: {e}"),
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("relay hub shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_connection(state: Arc<HubState>, stream: TcpStream) -> Result<(), Error> {
    eprintln!("DBG: handle_connection entered");
    let mut client_id = String::from("anonymous");
    let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
        if let Some(query) = req.uri().query() {
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                if k == "clientId" {
                    client_id = v.into_owned();
                }
            }
        }
        Ok(resp)
    })
    .await;
    if let Err(ref e) = ws {
        eprintln!("DBG: server handshake error = {e:?}");
    }
    let ws = ws?;

    let (connection_id, mut queue) = state.register(&client_id);
    info!("relay hub: '{client_id}' connected ({connection_id})");

    let (mut sink, mut source) = ws.split();

    // Writer: drains this connection's private queue. An error here means
    // the socket is gone; the reader side notices and unregisters.
    let writer = tokio::spawn(async move {
        while let Some(envelope) = queue.recv().await {
            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(e) => {
                    warn!("relay hub: could not encode envelope: {e}");
                    continue;
                }
            };
            if sink.send(Message::text(json)).await.is_err() {
                break;
            }
        }
    });

    // Reader: every text frame from this connection is a publish.
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(txt)) => match serde_json::from_str::<RelayEnvelope>(&txt) {
                Ok(mut envelope) => {
                    if envelope.source.is_empty() {
                        envelope.source = client_id.clone();
                    }
                    let delivered = state.broadcast(&envelope, Some(connection_id));
                    debug!(
                        "relay hub: '{}' from '{client_id}' fanned out to {delivered} subscriber(s)",
                        envelope.event.event_name()
                    );
                }
                Err(e) => warn!("relay hub: dropping malformed frame from '{client_id}': {e}"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("relay hub: read error from '{client_id}': {e}");
                break;
            }
        }
    }

    state.unregister(connection_id);
    writer.abort();
    info!("relay hub: '{client_id}' disconnected");
    Ok(())
}
