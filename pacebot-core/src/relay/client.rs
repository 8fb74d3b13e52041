//! src/relay/client.rs
//!
//! Persistent connection from a bot process to the relay hub. A
//! supervisor task owns the socket: it reconnects with capped exponential
//! backoff, surfaces inbound envelopes on an mpsc channel in delivery
//! order, and flushes queued emits after each successful connect. Events
//! the hub broadcast while this process was disconnected are gone; the
//! membership reconcile pass is the backstop for those.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use pacebot_common::models::relay::{RelayEnvelope, RelayEvent};

use crate::platforms::ConnectionStatus;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct RelayClient {
    client_id: String,
    outgoing: mpsc::UnboundedSender<RelayEnvelope>,
    incoming: Option<mpsc::UnboundedReceiver<RelayEnvelope>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    supervisor: JoinHandle<()>,
}

impl RelayClient {
    /// Opens (and keeps reopening) a connection to the hub. Returns
    /// immediately; the supervisor task performs the first connect too.
    pub fn connect(url: &str, client_id: &str) -> Self {
        let (tx_out, rx_out) = mpsc::unbounded_channel();
        let (tx_in, rx_in) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        let connect_url = format!("{url}?clientId={}", urlencoding::encode(client_id));
        let supervisor = tokio::spawn(supervisor_loop(connect_url, tx_in, rx_out, status_tx));

        Self {
            client_id: client_id.to_string(),
            outgoing: tx_out,
            incoming: Some(rx_in),
            status_rx,
            supervisor,
        }
    }

    /// Publishes an event through the hub. Queued locally while the
    /// connection is down and flushed on the next successful connect.
    pub fn emit(&self, event: RelayEvent) {
        let envelope = RelayEnvelope { event, source: self.client_id.clone() };
        let _ = self.outgoing.send(envelope);
    }

    /// Hands out the inbound event stream; callable once. Producer-only
    /// clients simply never take it.
    pub fn take_incoming(&mut self) -> Option<mpsc::UnboundedReceiver<RelayEnvelope>> {
        self.incoming.take()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Aborts the supervisor, dropping the socket.
    pub fn shutdown(self) {
        self.supervisor.abort();
    }
}

async fn supervisor_loop(
    url: String,
    tx_in: mpsc::UnboundedSender<RelayEnvelope>,
    mut rx_out: mpsc::UnboundedReceiver<RelayEnvelope>,
    status_tx: watch::Sender<ConnectionStatus>,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        eprintln!("DBG: connecting to {url}");
        let (ws, _) = match connect_async(url.as_str()).await {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("DBG: connect error {e}");
                warn!("relay connect error: {e}; retrying in {backoff:?}");
                let _ = status_tx.send(ConnectionStatus::Reconnecting);
                sleep(with_jitter(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        info!("relay connected");
        let _ = status_tx.send(ConnectionStatus::Connected);
        backoff = INITIAL_BACKOFF;

        let (mut sink, mut source) = ws.split();

        loop {
            tokio::select! {
                inbound = source.next() => {
                    match inbound {
                        Some(Ok(Message::Text(txt))) => {
                            match serde_json::from_str::<RelayEnvelope>(&txt) {
                                Ok(envelope) => {
                                    if tx_in.send(envelope).is_err() {
                                        // Consumer gone; stop for good.
                                        let _ = status_tx.send(ConnectionStatus::Disconnected);
                                        return;
                                    }
                                }
                                Err(e) => warn!("relay: dropping malformed frame: {e}"),
                            }
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                        // Binary frames are not part of the protocol.
                        Some(Ok(Message::Binary(_) | Message::Frame(_))) => {}
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("relay connection closed by hub");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("relay read error: {e}");
                            break;
                        }
                    }
                }
                outbound = rx_out.recv() => {
                    match outbound {
                        Some(envelope) => {
                            match serde_json::to_string(&envelope) {
                                Ok(json) => {
                                    if let Err(e) = sink.send(Message::text(json)).await {
                                        warn!("relay send error: {e}");
                                        break;
                                    }
                                }
                                Err(e) => warn!("relay: could not encode envelope: {e}"),
                            }
                        }
                        None => {
                            // RelayClient dropped; close politely and stop.
                            let _ = sink.send(Message::Close(None)).await;
                            let _ = status_tx.send(ConnectionStatus::Disconnected);
                            return;
                        }
                    }
                }
            }
        }

        let _ = status_tx.send(ConnectionStatus::Reconnecting);
        sleep(with_jitter(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Small random spread so a fleet of clients does not reconnect in
/// lockstep after a hub restart.
fn with_jitter(base: Duration) -> Duration {
    let jitter_ms = rand::rng().random_range(0..250u64);
    base + Duration::from_millis(jitter_ms)
}
