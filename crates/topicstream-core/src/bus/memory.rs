//! Default in-process bus backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info, trace};

use super::{EventBus, EventListener, ListenerHandle, ListenerId, deliver};
use crate::error::{BusError, PublishError};
use crate::event::{Event, Payload};
use crate::topic::Topic;

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    listener: Arc<dyn EventListener>,
}

/// In-process bus keyed by topic.
///
/// Registrations live in a sharded map, so mutating or reading one topic's
/// bucket only locks that bucket's shard and unrelated topics proceed in
/// parallel. `publish` snapshots the bucket, releases the lock and then calls
/// each listener synchronously, which keeps per-(topic, listener) FIFO order
/// for sequential publishers and lets listeners re-enter the bus.
pub struct InMemoryEventBus {
    topics: DashMap<Topic, Vec<Registration>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a new bus wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn snapshot(&self, topic: &Topic) -> Vec<Registration> {
        self.topics
            .get(topic)
            .map(|bucket| bucket.value().clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    fn publish(&self, topic: &Topic, payload: Payload) -> Result<(), PublishError> {
        if self.is_closed() {
            return Err(PublishError::BusClosed);
        }

        let registrations = self.snapshot(topic);
        if registrations.is_empty() {
            trace!(topic = %topic, "No listeners for topic");
            return Ok(());
        }

        let event = Event::new(topic.clone(), payload);
        for registration in &registrations {
            deliver(registration.listener.as_ref(), registration.id, &event);
        }

        trace!(topic = %topic, listeners = registrations.len(), "Event published");
        Ok(())
    }

    fn subscribe(
        &self,
        topic: &Topic,
        listener: Arc<dyn EventListener>,
    ) -> Result<ListenerHandle, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.topics
            .entry(topic.clone())
            .or_default()
            .push(Registration { id, listener });

        debug!(topic = %topic, listener_id = %id, "Listener registered");
        Ok(ListenerHandle::new(id, topic.clone()))
    }

    fn unsubscribe(&self, handle: &ListenerHandle) {
        // Drops the bucket once its last registration is gone.
        self.topics.remove_if_mut(handle.topic(), |_, bucket| {
            bucket.retain(|r| r.id != handle.id());
            bucket.is_empty()
        });

        debug!(topic = %handle.topic(), listener_id = %handle.id(), "Listener removed");
    }

    fn listener_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(|b| b.len()).unwrap_or(0)
    }

    fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners: usize = self.topics.iter().map(|b| b.len()).sum();
        self.topics.clear();
        info!(listeners, "In-memory event bus shut down");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("topic_count", &self.topic_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
