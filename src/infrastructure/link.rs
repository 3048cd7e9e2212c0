//! Single-socket transport manager (spec.md §4.1), grounded in the teacher's
//! `BinanceWebSocketManager`: a writer task fed by an mpsc channel so pings
//! and ordinary sends share one sink, a reader loop that forwards every
//! parsed frame onto a broadcast channel, and a supervising reconnect loop
//! with capped backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::domain::errors::LinkError;

const BACKOFF_SEQUENCE_SECS: [u64; 4] = [1, 2, 5, 5];
const PING_INTERVAL: Duration = Duration::from_secs(10);
const AUTHORIZE_TIMEOUT: Duration = Duration::from_secs(5);
const INBOUND_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Authorized,
    Down,
    /// Terminal: `InvalidToken` on authorize. The process exits fatally.
    Fatal,
}

/// Maintains one WebSocket to the broker, derived from `app_id`. Exposes
/// `send`, a broadcast of parsed inbound frames, and a `LinkState` snapshot.
pub struct BrokerLink {
    url: String,
    token: String,
    outbound_tx: mpsc::Sender<Message>,
    outbound_rx: tokio::sync::Mutex<Option<mpsc::Receiver<Message>>>,
    inbound_tx: broadcast::Sender<Value>,
    state_tx: watch::Sender<LinkState>,
    closing: AtomicBool,
}

impl BrokerLink {
    pub fn new(app_id: &str, token: &str) -> Arc<Self> {
        let url = format!("wss://ws.derivws.com/websockets/v3?app_id={app_id}");
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (inbound_tx, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(LinkState::Connecting);
        Arc::new(Self {
            url,
            token: token.to_string(),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(Some(outbound_rx)),
            inbound_tx,
            state_tx,
            closing: AtomicBool::new(false),
        })
    }

    pub fn subscribe_inbound(&self) -> broadcast::Receiver<Value> {
        self.inbound_tx.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> LinkState {
        self.state_tx.borrow().clone()
    }

    /// Queues an outbound frame. Fails immediately without touching the
    /// socket if the link isn't currently authorized.
    pub fn send(&self, frame: Value) -> Result<(), LinkError> {
        if self.state() != LinkState::Authorized {
            return Err(LinkError::NotConnected);
        }
        let text = frame.to_string();
        self.outbound_tx
            .try_send(Message::Text(text.into()))
            .map_err(|_| LinkError::NotConnected)
    }

    /// Suppresses reconnect and tears the connection down.
    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.state_tx.send(LinkState::Down);
    }

    /// Spawns the supervising reconnect loop. Returns immediately; connection
    /// state is observed through `subscribe_state`.
    pub fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            self.run().await;
        });
    }

    async fn run(self: Arc<Self>) {
        let mut backoff_idx = 0usize;
        loop {
            if self.closing.load(Ordering::SeqCst) {
                return;
            }
            let _ = self.state_tx.send(LinkState::Connecting);
            match self.connect_and_stream().await {
                Ok(()) => {
                    backoff_idx = 0;
                }
                Err(LinkError::InvalidToken) => {
                    error!("authorize rejected: invalid token, exiting");
                    let _ = self.state_tx.send(LinkState::Fatal);
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "link dropped");
                }
            }
            if self.closing.load(Ordering::SeqCst) {
                return;
            }
            let _ = self.state_tx.send(LinkState::Down);
            let delay = BACKOFF_SEQUENCE_SECS
                [backoff_idx.min(BACKOFF_SEQUENCE_SECS.len() - 1)];
            backoff_idx += 1;
            info!(delay_secs = delay, "reconnecting");
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    async fn connect_and_stream(&self) -> Result<(), LinkError> {
        info!(url = %self.url, "connecting");
        let (ws_stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| LinkError::MalformedFrame(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let authorize = serde_json::json!({"authorize": self.token});
        write
            .send(Message::Text(authorize.to_string().into()))
            .await
            .map_err(|e| LinkError::MalformedFrame(e.to_string()))?;

        let response = tokio::time::timeout(AUTHORIZE_TIMEOUT, read.next())
            .await
            .map_err(|_| LinkError::Timeout(AUTHORIZE_TIMEOUT))?
            .ok_or(LinkError::LinkLost)?
            .map_err(|e| LinkError::MalformedFrame(e.to_string()))?;

        let authorized = match response {
            Message::Text(text) => {
                let value: Value = serde_json::from_str(&text)
                    .map_err(|e| LinkError::MalformedFrame(e.to_string()))?;
                if let Some(err) = value.get("error") {
                    let code = err.get("code").and_then(|c| c.as_str()).unwrap_or("");
                    if code == "InvalidToken" {
                        return Err(LinkError::InvalidToken);
                    }
                    return Err(LinkError::Broker {
                        code: code.to_string(),
                        message: err
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
                value
            }
            _ => return Err(LinkError::MalformedFrame("non-text authorize response".into())),
        };

        let _ = self.inbound_tx.send(authorized);
        let _ = self.state_tx.send(LinkState::Authorized);
        info!("authorized");

        // Own the outbound receiver for the lifetime of this connection so
        // pings and correlated sends share the one socket writer; handed
        // back to the Mutex below whatever the outcome, so the next
        // reconnect attempt can take it again.
        let mut outbound_rx = self
            .outbound_rx
            .lock()
            .await
            .take()
            .ok_or(LinkError::LinkLost)?;
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        ping_interval.tick().await; // first tick fires immediately, discard it

        let result = loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    let frame = serde_json::json!({"ping": 1});
                    if write.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break Err(LinkError::LinkLost);
                    }
                }
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(msg) => {
                            if write.send(msg).await.is_err() {
                                break Err(LinkError::LinkLost);
                            }
                        }
                        None => break Err(LinkError::LinkLost),
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<Value>(&text) {
                                Ok(value) => {
                                    let _ = self.inbound_tx.send(value);
                                }
                                Err(e) => {
                                    debug!(error = %e, "dropping malformed frame");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Err(LinkError::MalformedFrame(e.to_string())),
                    }
                }
            }
        };

        self.outbound_rx.lock().await.replace(outbound_rx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_fails_fast_when_not_authorized() {
        let link = BrokerLink::new("1089", "token");
        let err = link.send(serde_json::json!({"ping": 1})).unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
    }

    #[test]
    fn close_marks_state_down_and_is_observable() {
        let link = BrokerLink::new("1089", "token");
        let mut rx = link.subscribe_state();
        link.close();
        assert_eq!(*rx.borrow_and_update(), LinkState::Down);
    }

    #[test]
    fn backoff_sequence_caps_at_five_seconds() {
        assert_eq!(BACKOFF_SEQUENCE_SECS, [1, 2, 5, 5]);
        assert_eq!(BACKOFF_SEQUENCE_SECS[BACKOFF_SEQUENCE_SECS.len() - 1], 5);
    }
}
