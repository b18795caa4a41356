//! Live event hub: fan-out of typed frames to connected dashboard clients.
//!
//! Built on a broadcast channel so a slow or absent subscriber never stalls
//! a remediation run; emitting with zero subscribers is free. The axum
//! handler upgrades the socket, replays frames as JSON text, and answers
//! client pings with a heartbeat.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info};
use warden_common::{LiveFrame, LiveFrameKind};

/// Buffered frames per subscriber before a laggard starts losing history.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct LiveHub {
    tx: broadcast::Sender<LiveFrame>,
    clients: Arc<AtomicUsize>,
}

impl Default for LiveHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Broadcast a frame to every subscriber. Nobody listening is fine.
    pub fn emit(&self, kind: LiveFrameKind, data: serde_json::Value, incident_id: Option<&str>) {
        let frame = LiveFrame::new(kind, data, incident_id);
        let _ = self.tx.send(frame);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveFrame> {
        self.tx.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Drive one upgraded websocket until it closes or lags out.
    pub async fn run_client(&self, mut socket: WebSocket) {
        let mut rx = self.subscribe();
        let total = self.clients.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Live client connected ({} total)", total);

        // Greet so the client knows the channel is up.
        let hello = LiveFrame::new(
            LiveFrameKind::Heartbeat,
            json!({"status": "connected"}),
            None,
        );
        if send_frame(&mut socket, &hello).await.is_err() {
            self.drop_client();
            return;
        }

        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Ok(frame) => {
                        if send_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!("Live client lagged, {} frames dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Text(text))) if text == "ping" => {
                        let beat = LiveFrame::new(
                            LiveFrameKind::Heartbeat,
                            json!({"status": "alive"}),
                            None,
                        );
                        if send_frame(&mut socket, &beat).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                },
            }
        }

        self.drop_client();
    }

    fn drop_client(&self) {
        let remaining = self.clients.fetch_sub(1, Ordering::SeqCst) - 1;
        info!("Live client disconnected ({} remaining)", remaining);
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &LiveFrame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(text)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let hub = LiveHub::new();
        hub.emit(LiveFrameKind::Heartbeat, json!({}), None);
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_emitted_frame() {
        let hub = LiveHub::new();
        let mut rx = hub.subscribe();
        hub.emit(
            LiveFrameKind::StatusUpdate,
            json!({"status": "ANALYSING"}),
            Some("inc-1"),
        );
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.kind, LiveFrameKind::StatusUpdate);
        assert_eq!(frame.incident_id.as_deref(), Some("inc-1"));
    }

    #[tokio::test]
    async fn test_frames_fan_out_to_all_subscribers() {
        let hub = LiveHub::new();
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();
        hub.emit(LiveFrameKind::Resolved, json!({}), Some("inc-2"));
        assert_eq!(rx1.recv().await.unwrap().kind, LiveFrameKind::Resolved);
        assert_eq!(rx2.recv().await.unwrap().kind, LiveFrameKind::Resolved);
    }
}
