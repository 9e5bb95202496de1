use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Events that can occur in the capture-and-submission pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// A new item landed in the buffer
    ItemCaptured {
        item_id: Uuid,
        timestamp: SystemTime,
    },
    /// The buffer was full and the oldest item was dropped
    ItemEvicted {
        item_id: Uuid,
        timestamp: SystemTime,
    },
    /// A single item's durable upload failed; the batch continued
    UploadFailed {
        index: usize,
        details: String,
        timestamp: SystemTime,
    },
    /// Ghost Mode obtained a location fix
    GhostLocationAcquired {
        accuracy_m: f64,
        timestamp: SystemTime,
    },
    /// Ghost Mode location request failed; overlay is not ready
    GhostLocationFailed {
        details: String,
        timestamp: SystemTime,
    },
    /// The capture session was torn down
    SessionClosed {
        reason: String,
        timestamp: SystemTime,
    },
}

impl ScanEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            ScanEvent::ItemCaptured { timestamp, .. } => *timestamp,
            ScanEvent::ItemEvicted { timestamp, .. } => *timestamp,
            ScanEvent::UploadFailed { timestamp, .. } => *timestamp,
            ScanEvent::GhostLocationAcquired { timestamp, .. } => *timestamp,
            ScanEvent::GhostLocationFailed { timestamp, .. } => *timestamp,
            ScanEvent::SessionClosed { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ScanEvent::ItemCaptured { item_id, .. } => {
                format!("Item captured: {}", item_id)
            }
            ScanEvent::ItemEvicted { item_id, .. } => {
                format!("Item evicted: {}", item_id)
            }
            ScanEvent::UploadFailed { index, details, .. } => {
                format!("Upload of item {} failed: {}", index, details)
            }
            ScanEvent::GhostLocationAcquired { accuracy_m, .. } => {
                format!("Location fix acquired (±{:.0}m)", accuracy_m)
            }
            ScanEvent::GhostLocationFailed { details, .. } => {
                format!("Location request failed: {}", details)
            }
            ScanEvent::SessionClosed { reason, .. } => {
                format!("Session closed: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::ItemCaptured { .. } => "item_captured",
            ScanEvent::ItemEvicted { .. } => "item_evicted",
            ScanEvent::UploadFailed { .. } => "upload_failed",
            ScanEvent::GhostLocationAcquired { .. } => "ghost_location_acquired",
            ScanEvent::GhostLocationFailed { .. } => "ghost_location_failed",
            ScanEvent::SessionClosed { .. } => "session_closed",
        }
    }
}

/// Async event bus for surfacing per-item warnings to observers using
/// broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers. Events published with no
    /// subscribers are dropped silently.
    pub fn publish(&self, event: ScanEvent) {
        debug!("Publishing event: {}", event.description());

        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!("Event delivered to {} subscribers", receiver_count);
            }
            Err(_) => {
                // No active subscribers
            }
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Drain any pending events from a receiver, logging lag instead of
/// failing when the subscriber fell behind.
pub fn drain_pending(receiver: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!("Event subscriber lagged by {} events; continuing", skipped);
                continue;
            }
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(ScanEvent::SessionClosed {
            reason: "user".to_string(),
            timestamp: SystemTime::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "session_closed");
        assert!(event.description().contains("user"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(ScanEvent::UploadFailed {
            index: 2,
            details: "timeout".to_string(),
            timestamp: SystemTime::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_pending_collects_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        for index in 0..3 {
            bus.publish(ScanEvent::UploadFailed {
                index,
                details: "x".to_string(),
                timestamp: SystemTime::now(),
            });
        }

        let drained = drain_pending(&mut rx);
        assert_eq!(drained.len(), 3);
        assert!(matches!(drained[0], ScanEvent::UploadFailed { index: 0, .. }));
        assert!(matches!(drained[2], ScanEvent::UploadFailed { index: 2, .. }));
    }
}
