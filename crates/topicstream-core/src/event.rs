//! Events carried by the bus.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::topic::Topic;

/// Event payload. Untyped at the bus level; wrapped in `Arc` so fan-out to
/// many listeners does not deep-clone the JSON tree.
pub type Payload = Arc<serde_json::Value>;

/// A payload published to a topic.
#[derive(Debug, Clone)]
pub struct Event {
    /// Topic the event was published to.
    pub topic: Topic,
    /// Opaque payload.
    pub payload: Payload,
    /// Timestamp of the publish call.
    pub published_at: OffsetDateTime,
}

impl Event {
    /// Create a new event stamped with the current time.
    pub fn new(topic: Topic, payload: Payload) -> Self {
        Self {
            topic,
            payload,
            published_at: OffsetDateTime::now_utc(),
        }
    }

    /// Check if this event was published to `topic`.
    pub fn matches_topic(&self, topic: &Topic) -> bool {
        &self.topic == topic
    }
}
