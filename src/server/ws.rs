use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

/// Interval between Ping frames.
const PING_EVERY: Duration = Duration::from_secs(30);

/// A client silent for longer than this after a Ping is dropped.
const PONG_DEADLINE: Duration = Duration::from_secs(60);

/// Ping/Pong bookkeeping for one event-stream connection.
#[derive(Debug)]
struct Keepalive {
    last_pong: Instant,
    awaiting_pong: bool,
}

impl Keepalive {
    fn new(now: Instant) -> Self {
        Self {
            last_pong: now,
            awaiting_pong: false,
        }
    }

    /// Called on every ping tick. `false` means the client missed its deadline.
    fn should_ping(&mut self, now: Instant) -> bool {
        if self.awaiting_pong && now.duration_since(self.last_pong) > PONG_DEADLINE {
            return false;
        }
        self.awaiting_pong = true;
        true
    }

    fn pong(&mut self, now: Instant) {
        self.last_pong = now;
        self.awaiting_pong = false;
    }
}

/// Upgrade to a socket that streams serialized backend events from `events`.
pub async fn ws_handler_with_sender(
    ws: WebSocketUpgrade,
    events: broadcast::Sender<String>,
) -> impl IntoResponse {
    let stream = events.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, stream))
}

/// Forward events to the client until it goes away. Client frames other than
/// Pong and Close are ignored; requests go through `/api/invoke`.
async fn stream_events(socket: WebSocket, mut events: broadcast::Receiver<String>) {
    tracing::debug!("Event stream client connected");
    let (mut outgoing, mut incoming) = socket.split();

    let mut ticker = tokio::time::interval(PING_EVERY);
    // Skip the immediate first tick.
    ticker.tick().await;
    let mut keepalive = Keepalive::new(Instant::now());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !keepalive.should_ping(Instant::now()) {
                    tracing::debug!("Event stream client missed its pong deadline");
                    break;
                }
                if outgoing.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(json) => {
                    if outgoing.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream client lagged");
                }
                Err(RecvError::Closed) => break,
            },
            frame = incoming.next() => match frame {
                Some(Ok(Message::Pong(_))) => keepalive.pong(Instant::now()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Event stream read failed");
                    break;
                }
            },
        }
    }

    let _ = outgoing.send(Message::Close(None)).await;
    tracing::debug!("Event stream client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_outlasts_ping_interval() {
        assert!(PONG_DEADLINE > PING_EVERY);
    }

    #[test]
    fn test_answered_pings_keep_connection() {
        let start = Instant::now();
        let mut keepalive = Keepalive::new(start);
        for round in 1..=5u32 {
            let now = start + PING_EVERY * round;
            assert!(keepalive.should_ping(now));
            keepalive.pong(now + Duration::from_secs(1));
        }
    }

    #[test]
    fn test_silent_client_is_dropped_after_deadline() {
        let start = Instant::now();
        let mut keepalive = Keepalive::new(start);
        assert!(keepalive.should_ping(start + PING_EVERY));
        assert!(keepalive.should_ping(start + PING_EVERY * 2));
        assert!(!keepalive.should_ping(start + PING_EVERY * 3));
    }
}
