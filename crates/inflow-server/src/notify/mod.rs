//! Live completion notifications
//!
//! Completion events fan out over an in-process broadcast channel to every
//! connected WebSocket client. Delivery is fire-and-forget: slow or absent
//! subscribers never block the workers, and a lagging client just misses
//! the overwritten messages.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::{JobCompletedEvent, EVENT_JOB_COMPLETED};

/// Messages buffered per subscriber before old ones are dropped.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<JobCompletedEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Broadcast one completion event. A send with no subscribers is not an
    /// error; notifications are an optional side channel.
    pub fn job_completed(&self, event: JobCompletedEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobCompletedEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(notifier): State<Notifier>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, notifier))
}

/// Forward broadcast events to one client until either side closes.
async fn serve_socket(mut socket: WebSocket, notifier: Notifier) {
    let mut rx = notifier.subscribe();
    debug!("websocket client connected");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let frame = json!({
                            "event": EVENT_JOB_COMPLETED,
                            "data": event,
                        });
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("failed to encode notification: {}", e);
                                continue;
                            },
                        };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "websocket client lagged, notifications dropped");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            },
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {},
                }
            },
        }
    }

    debug!("websocket client disconnected");
}
