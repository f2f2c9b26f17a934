//! Topic-addressed publish/subscribe bus.
//!
//! The bus is process-wide infrastructure with no domain knowledge. It is an
//! explicitly constructed object shared behind `Arc<dyn EventBus>`; sessions
//! and publishers hold a reference to it, the bus never holds a session.
//!
//! # Architecture
//!
//! ```text
//!   Publisher ──publish(topic, payload)──►  EventBus
//!                                             │  topic → [listeners]
//!                       ┌─────────────────────┼─────────────────────┐
//!                       ▼                     ▼                     ▼
//!                 ChannelListener       ChannelListener       custom listener
//!                 (session A queue)     (session B queue)
//! ```
//!
//! # Rules
//!
//! - **Non-blocking publish**: `publish` never waits for listener processing.
//! - **Isolation**: a listener that fails or panics does not affect other
//!   listeners or the publisher.
//! - **Ordering**: events on one topic are observed by one listener in
//!   publish order.
//! - **No persistence**: events published while nobody listens are lost.
//!
//! Two backends are provided: [`InMemoryEventBus`] (default) and
//! [`BroadcastEventBus`]. Other backends (e.g. a distributed channel) can be
//! plugged in by implementing [`EventBus`] with the same ordering rules.

mod broadcast;
mod memory;

pub use broadcast::BroadcastEventBus;
pub use memory::InMemoryEventBus;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, trace, warn};

use crate::config::{BusConfig, EventBusKind};
use crate::error::{BusError, ListenerError, PublishError};
use crate::event::{Event, Payload};
use crate::topic::Topic;

/// Identifier of one listener registration, unique per bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle returned by [`EventBus::subscribe`], used for removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    id: ListenerId,
    topic: Topic,
}

impl ListenerHandle {
    pub(crate) fn new(id: ListenerId, topic: Topic) -> Self {
        Self { id, topic }
    }

    /// Registration id.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Topic the registration listens to.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

/// Callback invoked by the bus for every event on a registered topic.
///
/// Implementations must return quickly and never block: hand heavy work to a
/// queue (see [`ChannelListener`]). Errors are logged by the bus and go no
/// further.
pub trait EventListener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &Event) -> Result<(), ListenerError>;

    /// The backend lost `missed` events on `topic` for this listener and
    /// dropped the registration. Nothing more arrives through it.
    fn on_overflow(&self, topic: &Topic, missed: u64) {
        let _ = (topic, missed);
    }
}

impl<F> EventListener for F
where
    F: Fn(&Event) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Listener that forwards events into an unbounded FIFO queue.
///
/// Sending never blocks, so the publisher is never slowed down by the
/// consumer. Once the receiver is dropped the listener reports
/// [`ListenerError::Disconnected`].
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Debug)]
enum Delivery {
    Event(Event),
    Overflow { topic: Topic, missed: u64 },
}

/// Overflow reported by the bus for a [`ChannelListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overflow {
    /// Topic whose registration fell behind.
    pub topic: Topic,
    /// Number of events that were lost.
    pub missed: u64,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its queue.
    pub fn new() -> (Self, ListenerQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self { sender },
            ListenerQueue {
                receiver,
                overflow: None,
            },
        )
    }

    /// Returns true if the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl EventListener for ChannelListener {
    fn on_event(&self, event: &Event) -> Result<(), ListenerError> {
        self.sender
            .send(Delivery::Event(event.clone()))
            .map_err(|_| ListenerError::Disconnected)
    }

    fn on_overflow(&self, topic: &Topic, missed: u64) {
        let _ = self.sender.send(Delivery::Overflow {
            topic: topic.clone(),
            missed,
        });
    }
}

/// Receiving end of a [`ChannelListener`].
///
/// Events come out in the order the bus delivered them. An overflow report
/// ends the queue: everything delivered before it is still returned, then
/// the queue closes and [`ListenerQueue::overflow`] tells why.
#[derive(Debug)]
pub struct ListenerQueue {
    receiver: mpsc::UnboundedReceiver<Delivery>,
    overflow: Option<Overflow>,
}

impl ListenerQueue {
    /// Wait for the next event. `None` once every sender is gone or after an
    /// overflow.
    pub async fn recv(&mut self) -> Option<Event> {
        if self.overflow.is_some() {
            return None;
        }
        match self.receiver.recv().await? {
            Delivery::Event(event) => Some(event),
            Delivery::Overflow { topic, missed } => {
                self.mark_overflow(topic, missed);
                None
            }
        }
    }

    /// Take the next event without waiting.
    pub fn try_recv(&mut self) -> Result<Event, mpsc::error::TryRecvError> {
        if self.overflow.is_some() {
            return Err(mpsc::error::TryRecvError::Disconnected);
        }
        match self.receiver.try_recv()? {
            Delivery::Event(event) => Ok(event),
            Delivery::Overflow { topic, missed } => {
                self.mark_overflow(topic, missed);
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Stop accepting deliveries. Queued events are discarded on drop.
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// The overflow that ended this queue, if any.
    pub fn overflow(&self) -> Option<&Overflow> {
        self.overflow.as_ref()
    }

    fn mark_overflow(&mut self, topic: Topic, missed: u64) {
        self.receiver.close();
        self.overflow = Some(Overflow { topic, missed });
    }
}

/// Pluggable bus backend.
pub trait EventBus: Send + Sync {
    /// Backend name (for logging).
    fn name(&self) -> &'static str;

    /// Deliver `payload` to every listener currently registered for `topic`.
    ///
    /// Returns without waiting for listeners to finish.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::BusClosed`] after [`EventBus::shutdown`].
    fn publish(&self, topic: &Topic, payload: Payload) -> Result<(), PublishError>;

    /// Register `listener` for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`EventBus::shutdown`].
    fn subscribe(
        &self,
        topic: &Topic,
        listener: Arc<dyn EventListener>,
    ) -> Result<ListenerHandle, BusError>;

    /// Remove a registration. Removing an unknown or already removed handle is a no-op.
    fn unsubscribe(&self, handle: &ListenerHandle);

    /// Number of listeners registered for `topic`.
    fn listener_count(&self, topic: &Topic) -> usize;

    /// Number of topics with at least one listener.
    fn topic_count(&self) -> usize;

    /// Stop accepting publishes and registrations and drop all listeners.
    fn shutdown(&self);

    /// Returns true once the bus has been shut down.
    fn is_closed(&self) -> bool;
}

/// Build the configured backend.
///
/// The broadcast backend spawns forwarding tasks, so it must be created
/// inside a tokio runtime.
pub fn build_event_bus(config: &BusConfig) -> Arc<dyn EventBus> {
    let bus: Arc<dyn EventBus> = match config.backend {
        EventBusKind::InMemory => Arc::new(InMemoryEventBus::new()),
        EventBusKind::Broadcast => Arc::new(BroadcastEventBus::with_capacity(
            config.broadcast_capacity,
        )),
    };
    tracing::info!(backend = bus.name(), "Event bus created");
    bus
}

/// Invoke one listener with error and panic isolation.
pub(crate) fn deliver(listener: &dyn EventListener, id: ListenerId, event: &Event) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));

    match result {
        Ok(Ok(())) => {
            trace!(listener_id = %id, topic = %event.topic, "Event delivered");
        }
        Ok(Err(ListenerError::Disconnected)) => {
            // The session is closing; its registration is about to be removed.
            trace!(listener_id = %id, topic = %event.topic, "Listener disconnected");
        }
        Ok(Err(e)) => {
            warn!(
                listener_id = %id,
                topic = %event.topic,
                error = %e,
                "Listener failed"
            );
        }
        Err(panic) => {
            let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!(
                listener_id = %id,
                topic = %event.topic,
                panic = %panic_msg,
                "Listener panicked"
            );
        }
    }
}
