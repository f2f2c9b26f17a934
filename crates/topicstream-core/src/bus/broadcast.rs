//! Bus backend on top of a single `tokio::sync::broadcast` channel.
//!
//! Every registration owns a receiver and a forwarding task that drops events
//! for other topics and hands matching ones to its listener in receive order.
//!
//! ## Capacity behavior
//! The ring buffer is shared by all receivers. A forwarder that falls more than
//! `capacity` events behind observes `RecvError::Lagged(n)`. There is no
//! replay, so the registration ends there: the listener gets
//! [`EventListener::on_overflow`] and receives nothing further. A session
//! listening through it closes instead of continuing with a gap.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{EventBus, EventListener, ListenerHandle, ListenerId, deliver};
use crate::error::{BusError, PublishError};
use crate::event::{Event, Payload};
use crate::topic::Topic;

/// Default buffer size for the broadcast channel.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

struct Forwarder {
    topic: Topic,
    task: JoinHandle<()>,
}

/// Broadcast-channel bus backend.
pub struct BroadcastEventBus {
    sender: broadcast::Sender<Event>,
    forwarders: DashMap<ListenerId, Forwarder>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl BroadcastEventBus {
    /// Create a new bus with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new bus with custom buffer size (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            forwarders: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    async fn forward(
        id: ListenerId,
        topic: Topic,
        listener: Arc<dyn EventListener>,
        mut receiver: broadcast::Receiver<Event>,
    ) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if !event.matches_topic(&topic) {
                        continue;
                    }
                    deliver(listener.as_ref(), id, &event);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        listener_id = %id,
                        topic = %topic,
                        missed,
                        "Listener lagged behind the broadcast buffer, ending registration"
                    );
                    listener.on_overflow(&topic, missed);
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(listener_id = %id, "Broadcast channel closed");
                    break;
                }
            }
        }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for BroadcastEventBus {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn publish(&self, topic: &Topic, payload: Payload) -> Result<(), PublishError> {
        if self.is_closed() {
            return Err(PublishError::BusClosed);
        }
        // An error only means there are no receivers at all.
        let receivers = self
            .sender
            .send(Event::new(topic.clone(), payload))
            .unwrap_or_default();
        trace!(topic = %topic, receivers, "Event broadcast");
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
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BusError::Backend(format!("no tokio runtime: {e}")))?;

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        // Subscribe before spawning so nothing published after this call is missed.
        let receiver = self.sender.subscribe();
        let task = runtime.spawn(Self::forward(id, topic.clone(), listener, receiver));

        self.forwarders.insert(
            id,
            Forwarder {
                topic: topic.clone(),
                task,
            },
        );

        debug!(topic = %topic, listener_id = %id, "Listener registered");
        Ok(ListenerHandle::new(id, topic.clone()))
    }

    fn unsubscribe(&self, handle: &ListenerHandle) {
        if let Some((_, forwarder)) = self.forwarders.remove(&handle.id()) {
            forwarder.task.abort();
            debug!(topic = %handle.topic(), listener_id = %handle.id(), "Listener removed");
        }
    }

    fn listener_count(&self, topic: &Topic) -> usize {
        self.forwarders
            .iter()
            .filter(|entry| &entry.value().topic == topic)
            .count()
    }

    fn topic_count(&self) -> usize {
        self.forwarders
            .iter()
            .map(|entry| entry.value().topic.clone())
            .collect::<HashSet<_>>()
            .len()
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners = self.forwarders.len();
        for entry in self.forwarders.iter() {
            entry.value().task.abort();
        }
        self.forwarders.clear();
        info!(listeners, "Broadcast event bus shut down");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for BroadcastEventBus {
    fn drop(&mut self) {
        for entry in self.forwarders.iter() {
            entry.value().task.abort();
        }
    }
}

impl std::fmt::Debug for BroadcastEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastEventBus")
            .field("listener_count", &self.forwarders.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
