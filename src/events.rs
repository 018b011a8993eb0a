use crate::alerts::AlertRecord;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// A primary entity tripped the velocity + proximity rule
    AnomalyDetected {
        track_id: i64,
        velocity: f64,
        nearby: usize,
        timestamp: SystemTime,
    },
    /// A trigger was dropped by the cooldown gate
    AlertSuppressed { message: String, reason: String },
    /// An alert task finished, successfully or not
    AlertCompleted { record: AlertRecord },
    /// Camera supervisor changed health
    CameraStatusChanged {
        alive: bool,
        timestamp: SystemTime,
    },
    /// The detector exceeded its consecutive failure limit
    DetectorOffline { consecutive_failures: u32 },
    /// Shutdown requested by signal or operator
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl MonitorEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            MonitorEvent::AnomalyDetected {
                track_id,
                velocity,
                nearby,
                ..
            } => format!(
                "Anomaly on track {}: {:.1}px/s with {} nearby",
                track_id, velocity, nearby
            ),
            MonitorEvent::AlertSuppressed { message, reason } => {
                format!("Alert '{}' suppressed: {}", message, reason)
            }
            MonitorEvent::AlertCompleted { record } => {
                format!("Alert '{}' finished: {}", record.message, record.outcome())
            }
            MonitorEvent::CameraStatusChanged { alive, .. } => {
                format!("Camera {}", if *alive { "online" } else { "offline" })
            }
            MonitorEvent::DetectorOffline {
                consecutive_failures,
            } => format!(
                "Detector offline after {} consecutive failures",
                consecutive_failures
            ),
            MonitorEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            MonitorEvent::AnomalyDetected { .. } => "anomaly_detected",
            MonitorEvent::AlertSuppressed { .. } => "alert_suppressed",
            MonitorEvent::AlertCompleted { .. } => "alert_completed",
            MonitorEvent::CameraStatusChanged { .. } => "camera_status_changed",
            MonitorEvent::DetectorOffline { .. } => "detector_offline",
            MonitorEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast bus for component coordination
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Publish to all subscribers; returns how many received it.
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: MonitorEvent) -> usize {
        match &event {
            MonitorEvent::AnomalyDetected { .. } => info!("{}", event.description()),
            MonitorEvent::CameraStatusChanged { alive, .. } => {
                if *alive {
                    info!("Camera online");
                } else {
                    warn!("Camera offline");
                }
            }
            MonitorEvent::DetectorOffline { .. } => error!("{}", event.description()),
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(8);
        let delivered = bus.publish(MonitorEvent::DetectorOffline {
            consecutive_failures: 10,
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(MonitorEvent::CameraStatusChanged {
            alive: false,
            timestamp: SystemTime::now(),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "camera_status_changed");
        assert_eq!(event.description(), "Camera offline");
    }
}
