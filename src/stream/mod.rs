//! Event stream source boundary.
//!
//! The engine consumes a per-user, cursor-addressable event stream. A
//! poll may return mixed event types; only message events are worth a
//! push notification.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use memory::InMemoryEventStream;

/// Opaque, totally-ordered position marker into a per-user event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamToken(pub i64);

impl std::fmt::Display for StreamToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message event: the only event type that triggers a push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    pub content: serde_json::Value,
}

/// A presence update, delivered interleaved with messages but never pushed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub user_id: String,
    pub presence: String,
}

/// One event as seen on the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    Message(MessageEvent),
    Presence(PresenceUpdate),
}

impl StreamEvent {
    /// The notification-worthy view of this event, if any.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            StreamEvent::Message(event) => Some(event),
            StreamEvent::Presence(_) => None,
        }
    }
}

/// A batch of events returned from one poll.
#[derive(Debug, Clone)]
pub struct EventBatch {
    /// End-of-batch cursor; polling from here yields strictly newer events.
    pub end: StreamToken,
    pub events: Vec<StreamEvent>,
}

/// Source of per-user event streams.
#[async_trait]
pub trait EventStreamSource: Send + Sync {
    /// Return the next batch of events visible to `user_id` strictly after
    /// `from`, blocking up to `wait` if none are yet available.
    ///
    /// A zero `wait` returns immediately with the current end-of-stream
    /// cursor and no events; this is the cursor bootstrap path.
    async fn fetch(
        &self,
        user_id: &str,
        from: Option<StreamToken>,
        wait: Duration,
    ) -> Result<EventBatch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_message_filters_presence() {
        let message = StreamEvent::Message(MessageEvent {
            event_id: "$ev1".to_string(),
            room_id: "!room:example.org".to_string(),
            sender: "@bob:example.org".to_string(),
            content: serde_json::json!({"body": "hi"}),
        });
        let presence = StreamEvent::Presence(PresenceUpdate {
            user_id: "@bob:example.org".to_string(),
            presence: "online".to_string(),
        });

        assert!(message.as_message().is_some());
        assert!(presence.as_message().is_none());
    }

    #[test]
    fn test_token_ordering() {
        assert!(StreamToken(2) > StreamToken(1));
        assert_eq!(StreamToken(3).to_string(), "3");
    }
}
