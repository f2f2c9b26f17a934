//! Publisher adapters handed to mutation and query code.
//!
//! Both shapes are thin wrappers over [`EventBus::publish`] and share its
//! delivery semantics. [`BoundPublisher`] fixes the topic at construction so
//! the call site cannot publish to the wrong one.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::bus::EventBus;
use crate::engine::Counters;
use crate::error::PublishError;
use crate::topic::Topic;

fn publish_to(
    bus: &dyn EventBus,
    counters: &Counters,
    topic: &Topic,
    value: Value,
) -> Result<(), PublishError> {
    bus.publish(topic, Arc::new(value))
        .inspect_err(|e| debug!(topic = %topic, error = %e, "Publish rejected"))?;
    counters.event_published();
    Ok(())
}

fn to_value(topic: &Topic, payload: impl Serialize) -> Result<Value, PublishError> {
    serde_json::to_value(payload).map_err(|source| PublishError::Serialization {
        topic: topic.clone(),
        source,
    })
}

/// Publish-by-topic handle.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn EventBus>,
    counters: Arc<Counters>,
}

impl Publisher {
    pub(crate) fn new(bus: Arc<dyn EventBus>, counters: Arc<Counters>) -> Self {
        Self { bus, counters }
    }

    /// Serialize `payload` and publish it to `topic`.
    ///
    /// Returns as soon as the event is handed to the bus.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Serialization`] if the payload cannot be
    /// converted to JSON and [`PublishError::BusClosed`] if the bus is down.
    pub fn publish(
        &self,
        topic: impl Into<Topic>,
        payload: impl Serialize,
    ) -> Result<(), PublishError> {
        let topic = topic.into();
        let value = to_value(&topic, payload)?;
        publish_to(self.bus.as_ref(), &self.counters, &topic, value)
    }

    /// Publish an already-built JSON value.
    pub fn publish_value(&self, topic: impl Into<Topic>, value: Value) -> Result<(), PublishError> {
        publish_to(self.bus.as_ref(), &self.counters, &topic.into(), value)
    }

    /// Bind this publisher to a single topic.
    pub fn bind(&self, topic: impl Into<Topic>) -> BoundPublisher {
        BoundPublisher {
            topic: topic.into(),
            inner: self.clone(),
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("bus", &self.bus.name())
            .finish()
    }
}

/// Publisher with a fixed topic.
#[derive(Clone)]
pub struct BoundPublisher {
    topic: Topic,
    inner: Publisher,
}

impl BoundPublisher {
    /// The fixed topic.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Serialize `payload` and publish it to the bound topic.
    pub fn publish(&self, payload: impl Serialize) -> Result<(), PublishError> {
        let value = to_value(&self.topic, payload)?;
        self.publish_value(value)
    }

    /// Publish an already-built JSON value to the bound topic.
    pub fn publish_value(&self, value: Value) -> Result<(), PublishError> {
        publish_to(
            self.inner.bus.as_ref(),
            &self.inner.counters,
            &self.topic,
            value,
        )
    }
}

impl std::fmt::Debug for BoundPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundPublisher")
            .field("topic", &self.topic)
            .finish()
    }
}

/// Either publisher shape, as returned by `get_publisher`.
#[derive(Debug, Clone)]
pub enum PublisherHandle {
    /// Topic chosen per call.
    Generic(Publisher),
    /// Topic fixed at construction.
    Bound(BoundPublisher),
}

impl PublisherHandle {
    /// Returns the bound topic, if any.
    pub fn bound_topic(&self) -> Option<&Topic> {
        match self {
            Self::Generic(_) => None,
            Self::Bound(bound) => Some(bound.topic()),
        }
    }

    /// Returns the generic publisher, if this is one.
    pub fn into_generic(self) -> Option<Publisher> {
        match self {
            Self::Generic(publisher) => Some(publisher),
            Self::Bound(_) => None,
        }
    }

    /// Returns the bound publisher, if this is one.
    pub fn into_bound(self) -> Option<BoundPublisher> {
        match self {
            Self::Generic(_) => None,
            Self::Bound(bound) => Some(bound),
        }
    }
}

impl From<Publisher> for PublisherHandle {
    fn from(publisher: Publisher) -> Self {
        Self::Generic(publisher)
    }
}

impl From<BoundPublisher> for PublisherHandle {
    fn from(bound: BoundPublisher) -> Self {
        Self::Bound(bound)
    }
}
