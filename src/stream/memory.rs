//! In-memory event stream source.
//!
//! A process-local implementation of [`EventStreamSource`] backed by a
//! single ordered buffer and `tokio::sync::Notify` wakeups for long-polling
//! consumers.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::{EventBatch, EventStreamSource, StreamEvent, StreamToken};
use crate::Result;

struct Entry {
    token: i64,
    user_id: String,
    event: StreamEvent,
}

struct Inner {
    last_token: i64,
    entries: Vec<Entry>,
}

/// In-memory event stream with long-poll support.
///
/// The buffer is append-only: published events are never pruned, since the
/// stream has no view of how far each consumer's cursor has advanced. Suited
/// to tests and short-lived processes, not as a durable event store.
pub struct InMemoryEventStream {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl InMemoryEventStream {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                last_token: 0,
                entries: Vec::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Append an event visible to `user_id` and wake any long-pollers.
    pub fn publish(&self, user_id: &str, event: StreamEvent) -> StreamToken {
        let token = {
            let mut inner = self.inner.lock();
            inner.last_token += 1;
            let token = inner.last_token;
            inner.entries.push(Entry {
                token,
                user_id: user_id.to_string(),
                event,
            });
            token
        };
        self.notify.notify_waiters();
        debug!("Published event at token {} for user {}", token, user_id);
        StreamToken(token)
    }

    fn end_token(&self) -> StreamToken {
        StreamToken(self.inner.lock().last_token)
    }

    /// Scan for the first message event for `user_id` after `from`,
    /// returning it together with any earlier non-message events.
    fn scan(&self, user_id: &str, from: i64) -> Option<EventBatch> {
        let inner = self.inner.lock();
        let mut events = Vec::new();
        for entry in inner
            .entries
            .iter()
            .filter(|e| e.token > from && e.user_id == user_id)
        {
            let is_message = entry.event.as_message().is_some();
            events.push(entry.event.clone());
            if is_message {
                return Some(EventBatch {
                    end: StreamToken(entry.token),
                    events,
                });
            }
        }
        None
    }
}

impl Default for InMemoryEventStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStreamSource for InMemoryEventStream {
    async fn fetch(
        &self,
        user_id: &str,
        from: Option<StreamToken>,
        wait: Duration,
    ) -> Result<EventBatch> {
        // Zero wait is the bootstrap path: current end of stream, no events.
        if wait.is_zero() {
            return Ok(EventBatch {
                end: self.end_token(),
                events: Vec::new(),
            });
        }

        let from = from.map(|t| t.0).unwrap_or(0);
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // Arm the notification before scanning so a publish between the
            // scan and the await cannot be missed.
            let notified = self.notify.notified();
            if let Some(batch) = self.scan(user_id, from) {
                return Ok(batch);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Ok(EventBatch {
                        end: StreamToken(from),
                        events: Vec::new(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{MessageEvent, PresenceUpdate};

    fn message(event_id: &str) -> StreamEvent {
        StreamEvent::Message(MessageEvent {
            event_id: event_id.to_string(),
            room_id: "!room:example.org".to_string(),
            sender: "@bob:example.org".to_string(),
            content: serde_json::json!({"body": "hi"}),
        })
    }

    fn presence() -> StreamEvent {
        StreamEvent::Presence(PresenceUpdate {
            user_id: "@bob:example.org".to_string(),
            presence: "online".to_string(),
        })
    }

    #[tokio::test]
    async fn test_zero_wait_returns_end_of_stream() {
        let stream = InMemoryEventStream::new();
        stream.publish("@alice:example.org", message("$ev1"));
        stream.publish("@alice:example.org", message("$ev2"));

        let batch = stream
            .fetch("@alice:example.org", None, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(batch.end, StreamToken(2));
        assert!(batch.events.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_returns_events_after_cursor() {
        let stream = InMemoryEventStream::new();
        stream.publish("@alice:example.org", message("$ev1"));
        stream.publish("@alice:example.org", message("$ev2"));

        let batch = stream
            .fetch(
                "@alice:example.org",
                Some(StreamToken(1)),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(batch.end, StreamToken(2));
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].as_message().unwrap().event_id, "$ev2");
    }

    #[tokio::test]
    async fn test_presence_included_before_message() {
        let stream = InMemoryEventStream::new();
        stream.publish("@alice:example.org", presence());
        stream.publish("@alice:example.org", message("$ev1"));

        let batch = stream
            .fetch("@alice:example.org", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(batch.events.len(), 2);
        assert!(batch.events[0].as_message().is_none());
        assert!(batch.events[1].as_message().is_some());
    }

    #[tokio::test]
    async fn test_events_scoped_per_user() {
        let stream = InMemoryEventStream::new();
        stream.publish("@bob:example.org", message("$ev1"));

        let batch = stream
            .fetch("@alice:example.org", None, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(batch.events.is_empty());
    }

    #[tokio::test]
    async fn test_publish_wakes_long_poll() {
        let stream = std::sync::Arc::new(InMemoryEventStream::new());

        let poller = {
            let stream = stream.clone();
            tokio::spawn(async move {
                stream
                    .fetch("@alice:example.org", None, Duration::from_secs(30))
                    .await
            })
        };

        // Let the poller park on the notify before publishing.
        tokio::task::yield_now().await;
        stream.publish("@alice:example.org", message("$ev1"));

        let batch = poller.await.unwrap().unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.end, StreamToken(1));
    }

    #[tokio::test]
    async fn test_timeout_returns_empty_batch_at_cursor() {
        let stream = InMemoryEventStream::new();
        let batch = stream
            .fetch(
                "@alice:example.org",
                Some(StreamToken(3)),
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        assert_eq!(batch.end, StreamToken(3));
        assert!(batch.events.is_empty());
    }
}
