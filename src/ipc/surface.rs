use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use super::channels::BackendEvent;

/// A UI endpoint that backend events are delivered to.
///
/// Surfaces can disappear at any time (a window closes, a socket drops).
/// Delivering to a destroyed surface is a no-op, never an error.
pub trait UiSurface: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> &str;

    fn is_destroyed(&self) -> bool;

    /// Hand one event to the surface. Only called while the surface is alive.
    fn deliver(&self, event: &BackendEvent);
}

/// Deliver `event` unless the surface is gone. Returns whether it was delivered.
pub fn forward_event(surface: &dyn UiSurface, event: &BackendEvent) -> bool {
    if surface.is_destroyed() {
        tracing::trace!(surface = surface.label(), channel = event.channel(), "Surface destroyed, skipping event");
        return false;
    }
    surface.deliver(event);
    true
}

/// Surface backed by a broadcast of serialized JSON, consumed by WebSocket clients.
pub struct BroadcastSurface {
    label: String,
    tx: broadcast::Sender<String>,
    destroyed: AtomicBool,
}

impl BroadcastSurface {
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            label: label.into(),
            tx,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<String> {
        self.tx.clone()
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

impl UiSurface for BroadcastSurface {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn deliver(&self, event: &BackendEvent) {
        match serde_json::to_string(event) {
            // No subscribers is fine; the event is simply not observed.
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(e) => tracing::warn!(channel = event.channel(), error = %e, "Failed to serialize event"),
        }
    }
}

/// Surface backed by a broadcast of typed events, consumed in-process.
pub struct ChannelSurface {
    label: String,
    tx: broadcast::Sender<BackendEvent>,
    destroyed: AtomicBool,
}

impl ChannelSurface {
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            label: label.into(),
            tx,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.tx.subscribe()
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

impl UiSurface for ChannelSurface {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn deliver(&self, event: &BackendEvent) {
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_to_live_surface() {
        let surface = ChannelSurface::new("test", 8);
        let mut rx = surface.subscribe();
        assert!(forward_event(&surface, &BackendEvent::ManagerStarted));
        assert_eq!(rx.try_recv().unwrap(), BackendEvent::ManagerStarted);
    }

    #[test]
    fn test_forward_to_destroyed_surface_is_noop() {
        let surface = ChannelSurface::new("test", 8);
        let mut rx = surface.subscribe();
        surface.destroy();
        assert!(!forward_event(&surface, &BackendEvent::ManagerStarted));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_surface_sends_json() {
        let surface = BroadcastSurface::new("ws", 8);
        let mut rx = surface.subscribe();
        forward_event(&surface, &BackendEvent::ManagerStopped);
        assert_eq!(rx.try_recv().unwrap(), r#"{"channel":"manager-stopped"}"#);
    }

    #[test]
    fn test_broadcast_without_subscribers_does_not_fail() {
        let surface = BroadcastSurface::new("ws", 8);
        assert!(forward_event(&surface, &BackendEvent::ManagerStopped));
    }
}
