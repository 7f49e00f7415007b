//! Real-time event channel.
//!
//! [`RealtimeChannel`] is the outbound half the engine needs (connection state
//! and emit). Inbound events arrive separately as an
//! `mpsc::Receiver<InboundEvent>` that is handed to
//! [`SyncEngine::run`](crate::SyncEngine::run).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use convoy_shared::protocol::{InboundEvent, OutboundEvent};

use crate::error::{Result, SyncError};
use crate::retry::RetryPolicy;

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Emit one event. Fails with [`SyncError::NotConnected`] while the
    /// connection is down.
    async fn emit(&self, event: OutboundEvent) -> Result<()>;
}

/// WebSocket implementation with automatic reconnect.
pub struct WsChannel {
    connected: Arc<AtomicBool>,
    outbound_tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl WsChannel {
    /// Start the connection task. Returns the channel handle and the stream
    /// of inbound events, including synthesized lifecycle events.
    pub fn spawn(
        url: &str,
        token: &str,
        retry: RetryPolicy,
    ) -> Result<(Self, mpsc::Receiver<InboundEvent>)> {
        let url = socket_url(url, token)?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(256);
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(connection_loop(
            url,
            Arc::clone(&connected),
            outbound_rx,
            events_tx,
            retry,
        ));

        Ok((
            Self {
                connected,
                outbound_tx,
                task,
            },
            events_rx,
        ))
    }

    pub fn shutdown(&self) {
        self.task.abort();
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl RealtimeChannel for WsChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: OutboundEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let frame = event.to_frame()?;
        self.outbound_tx
            .send(frame)
            .map_err(|_| SyncError::ChannelClosed)
    }
}

/// Browsers cannot set headers on WebSocket upgrades, so the backend takes
/// the bearer token as a query parameter.
fn socket_url(url: &str, token: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(url)
        .map_err(|e| SyncError::InvalidInput(format!("socket url {url}: {e}")))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

async fn connection_loop(
    url: String,
    connected: Arc<AtomicBool>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::Sender<InboundEvent>,
    retry: RetryPolicy,
) {
    let mut attempt: u32 = 0;
    let mut ever_connected = false;

    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                attempt = 0;
                connected.store(true, Ordering::SeqCst);

                let lifecycle = if ever_connected {
                    InboundEvent::Reconnected
                } else {
                    InboundEvent::Connected
                };
                ever_connected = true;
                info!(?lifecycle, "real-time channel up");
                if events_tx.send(lifecycle).await.is_err() {
                    return;
                }

                let (mut sink, mut stream) = socket.split();

                let consumer_gone = loop {
                    tokio::select! {
                        outbound = outbound_rx.recv() => match outbound {
                            Some(frame) => {
                                if let Err(e) = sink.send(WsMessage::Text(frame)).await {
                                    warn!(error = %e, "failed to write frame");
                                    break false;
                                }
                            }
                            None => {
                                let _ = sink.close().await;
                                break true;
                            }
                        },
                        incoming = stream.next() => match incoming {
                            Some(Ok(WsMessage::Text(text))) => match InboundEvent::decode(&text) {
                                Ok(event) => {
                                    if events_tx.send(event).await.is_err() {
                                        break true;
                                    }
                                }
                                Err(e) => debug!(error = %e, "ignoring inbound frame"),
                            },
                            Some(Ok(WsMessage::Close(_))) | None => break false,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "socket read failed");
                                break false;
                            }
                        },
                    }
                };

                connected.store(false, Ordering::SeqCst);
                if consumer_gone {
                    info!("real-time channel closed by consumer");
                    return;
                }
                warn!("real-time channel disconnected");
                if events_tx.send(InboundEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(error = %e, attempt, "real-time connect failed"),
        }

        let delay = retry.delay_for_attempt(attempt);
        attempt = attempt.saturating_add(1);
        debug!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_shared::RoomId;

    #[test]
    fn token_is_appended_as_query() {
        assert_eq!(
            socket_url("wss://rt.example.com/ws", "abc").unwrap(),
            "wss://rt.example.com/ws?token=abc"
        );
        assert_eq!(
            socket_url("wss://rt.example.com/ws?v=2", "abc").unwrap(),
            "wss://rt.example.com/ws?v=2&token=abc"
        );
    }

    #[test]
    fn token_is_percent_encoded() {
        let url = socket_url("wss://rt.example.com/ws", "a&b+c=d").unwrap();
        assert_eq!(url, "wss://rt.example.com/ws?token=a%26b%2Bc%3Dd");

        let parsed = reqwest::Url::parse(&url).unwrap();
        let token = parsed.query_pairs().find(|(k, _)| k == "token").unwrap().1;
        assert_eq!(token, "a&b+c=d");
    }

    #[test]
    fn malformed_socket_url_is_rejected() {
        let err = socket_url("not a url", "abc").unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn emit_fails_while_disconnected() {
        // nothing listens on this port; the loop keeps retrying in the background
        let (channel, _events) = WsChannel::spawn(
            "ws://127.0.0.1:9",
            "token",
            RetryPolicy::new(10_000, 10_000),
        )
        .unwrap();

        let err = channel
            .emit(OutboundEvent::JoinRoom {
                room_id: RoomId::new("r1"),
            })
            .await
            .expect_err("emit must fail before the socket is up");
        assert!(matches!(err, SyncError::NotConnected));
        channel.shutdown();
    }
}
