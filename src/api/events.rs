//! Activity events and their broadcaster
//!
//! Separate from the per-class live queries: these are notifications about
//! what happened (a submission, a reset) for dashboards and logs, not the
//! tally itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ClassId, Reaction};

/// Event type discriminant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    /// Feedback entry written
    FeedbackSubmitted {
        class_id: ClassId,
        reaction: Reaction,
        timestamp: DateTime<Utc>,
    },
    /// Tutor reset finished (possibly partially)
    FeedbackReset {
        class_id: ClassId,
        deleted: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
    /// A live stream could not deliver updates
    LiveUpdatesDegraded {
        class_id: ClassId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Server session started
    SessionStarted { timestamp: DateTime<Utc> },
    /// Heartbeat (published periodically when idle)
    Heartbeat { timestamp: DateTime<Utc> },
}

/// Event wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event ID (for deduplication)
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(flatten)]
    pub event_type: EventType,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instance_id: None,
            event_type,
        }
    }

    pub fn new_with_instance(event_type: EventType, instance_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instance_id: Some(instance_id),
            event_type,
        }
    }

    pub fn feedback_submitted(class_id: ClassId, reaction: Reaction) -> Self {
        Self::new(EventType::FeedbackSubmitted {
            class_id,
            reaction,
            timestamp: Utc::now(),
        })
    }

    pub fn feedback_reset(class_id: ClassId, deleted: usize, failed: usize) -> Self {
        Self::new(EventType::FeedbackReset {
            class_id,
            deleted,
            failed,
            timestamp: Utc::now(),
        })
    }

    pub fn live_updates_degraded(class_id: ClassId, reason: String) -> Self {
        Self::new(EventType::LiveUpdatesDegraded {
            class_id,
            reason,
            timestamp: Utc::now(),
        })
    }

    pub fn session_started(instance_id: String) -> Self {
        Self::new_with_instance(
            EventType::SessionStarted {
                timestamp: Utc::now(),
            },
            instance_id,
        )
    }

    pub fn heartbeat(instance_id: String) -> Self {
        Self::new_with_instance(
            EventType::Heartbeat {
                timestamp: Utc::now(),
            },
            instance_id,
        )
    }
}

/// Event broadcaster using tokio broadcast channel
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<Event>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Broadcast event to all subscribers
    ///
    /// Errors only when nobody is listening.
    pub fn broadcast(
        &self,
        event: Event,
    ) -> Result<usize, Box<broadcast::error::SendError<Event>>> {
        self.tx.send(event).map_err(Box::new)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = Event::feedback_submitted(ClassId::new("cs101"), Reaction::Slow);
        match event.event_type {
            EventType::FeedbackSubmitted {
                class_id, reaction, ..
            } => {
                assert_eq!(class_id.as_str(), "cs101");
                assert_eq!(reaction, Reaction::Slow);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_session_started_roundtrip() {
        let event = Event::session_started("abcd1234".to_string());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"session_started\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.instance_id.as_deref(), Some("abcd1234"));
    }

    #[test]
    fn test_event_roundtrip_keeps_instance() {
        let event = Event::heartbeat("abcd1234".to_string());
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json.matches("\"instance_id\"").count(), 1);
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.instance_id.as_deref(), Some("abcd1234"));
        assert_eq!(back.event_type, event.event_type);
    }

    #[tokio::test]
    async fn test_broadcaster() {
        let broadcaster = EventBroadcaster::new(10);
        assert!(broadcaster
            .broadcast(Event::heartbeat("x".to_string()))
            .is_err());

        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        let event = Event::feedback_submitted(ClassId::new("cs101"), Reaction::Good);
        broadcaster.broadcast(event.clone()).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event.id);
    }
}
