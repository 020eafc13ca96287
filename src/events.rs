use crate::backend::BackendKind;
use crate::error::EventBusError;
use crate::session::{DetectionEvent, SessionState};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notifications emitted by scan sessions
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A session moved between lifecycle states
    StateChanged {
        backend: BackendKind,
        from: SessionState,
        to: SessionState,
        timestamp: SystemTime,
    },
    /// The camera accepted a higher zoom level
    ZoomChanged {
        backend: BackendKind,
        level: f64,
        max: f64,
        timestamp: SystemTime,
    },
    /// First successful decode of a session
    Detected(DetectionEvent),
    /// Session failed with a user-visible message
    Failed {
        backend: BackendKind,
        message: String,
        timestamp: SystemTime,
    },
}

impl ScanEvent {
    pub fn backend(&self) -> BackendKind {
        match self {
            ScanEvent::StateChanged { backend, .. }
            | ScanEvent::ZoomChanged { backend, .. }
            | ScanEvent::Failed { backend, .. } => *backend,
            ScanEvent::Detected(event) => event.backend,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ScanEvent::StateChanged { backend, from, to, .. } => {
                format!("{}: {:?} -> {:?}", backend, from, to)
            }
            ScanEvent::ZoomChanged {
                backend, level, max, ..
            } => format!("{} zoom {:.1}x (max {:.1}x)", backend, level, max),
            ScanEvent::Detected(event) => format!("{} decoded {}", event.backend, event.value),
            ScanEvent::Failed {
                backend, message, ..
            } => format!("{} failed: {}", backend, message),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::StateChanged { .. } => "state_changed",
            ScanEvent::ZoomChanged { .. } => "zoom_changed",
            ScanEvent::Detected(_) => "detected",
            ScanEvent::Failed { .. } => "failed",
        }
    }
}

/// Broadcast bus for session notifications. Publishing never blocks, so it
/// is safe to call while session state is locked.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers; returns how many received it
    pub fn publish(&self, event: ScanEvent) -> usize {
        match &event {
            ScanEvent::Detected(detection) => {
                info!("{} detected {}", detection.backend, detection.value);
            }
            ScanEvent::Failed {
                backend, message, ..
            } => {
                warn!("{} session failed: {}", backend, message);
            }
            _ => debug!("Event: {}", event.description()),
        }

        // No subscribers is not an error for a notification bus
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    Backend(BackendKind),
}

impl EventFilter {
    pub fn matches(&self, event: &ScanEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Backend(backend) => event.backend() == *backend,
        }
    }
}

/// Receiver that skips events its filter rejects
pub struct EventReceiver {
    receiver: broadcast::Receiver<ScanEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<ScanEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<ScanEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, missed);
                    return Err(EventBusError::Lagged { missed });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<ScanEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, missed);
                    return Err(EventBusError::Lagged { missed });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::time::{timeout, Duration};

    fn zoom_event(backend: BackendKind) -> ScanEvent {
        ScanEvent::ZoomChanged {
            backend,
            level: 1.5,
            max: 3.0,
            timestamp: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        assert_eq!(event_bus.publish(zoom_event(BackendKind::Native)), 1);

        match receiver.recv().await.unwrap() {
            ScanEvent::ZoomChanged { level, .. } => assert_eq!(level, 1.5),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(10);
        assert_eq!(event_bus.subscriber_count(), 0);
        assert_eq!(event_bus.publish(zoom_event(BackendKind::Zxing)), 0);
    }

    #[test]
    fn test_event_properties() {
        let detected = ScanEvent::Detected(DetectionEvent {
            value: "4006381333931".to_string(),
            backend: BackendKind::Quagga,
            timestamp: Utc::now(),
        });
        assert_eq!(detected.event_type(), "detected");
        assert_eq!(detected.backend(), BackendKind::Quagga);
        assert_eq!(detected.description(), "Quagga decoded 4006381333931");

        let changed = ScanEvent::StateChanged {
            backend: BackendKind::Native,
            from: SessionState::Acquiring,
            to: SessionState::Streaming,
            timestamp: SystemTime::now(),
        };
        assert_eq!(changed.description(), "Native: Acquiring -> Streaming");
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::Backend(BackendKind::Html5Qrcode);
        let mut receiver = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus.publish(zoom_event(BackendKind::Native));
        event_bus.publish(zoom_event(BackendKind::Html5Qrcode));

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.backend(), BackendKind::Html5Qrcode);
        assert!(receiver.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lagged_receiver_reports_error() {
        let event_bus = EventBus::new(2);
        let mut receiver =
            EventReceiver::new(event_bus.subscribe(), EventFilter::All, "slow".to_string());

        for _ in 0..5 {
            event_bus.publish(zoom_event(BackendKind::Native));
        }
        assert!(matches!(
            receiver.recv().await,
            Err(EventBusError::Lagged { .. })
        ));
    }
}
