//! Subscription sessions.
//!
//! A session binds one subscribe operation to its resolved topics, its filter
//! and its field resolver. It owns its bus registrations and exposes the
//! projected results as a lazy [`SubscriptionStream`].
//!
//! ## Lifecycle
//!
//! ```text
//!  Initializing ──► Active ──► Draining ──► Closed
//!        │                                    ▲
//!        └────────── (resolution / registration failure)
//! ```
//!
//! - **Initializing**: topics are resolved and one registration per topic is
//!   installed. Any failure rolls back the registrations already made.
//! - **Active**: events are filtered and projected one at a time, in arrival
//!   order. Events arriving while a projection is suspended wait in the
//!   session queue.
//! - **Draining**: entered on [`SessionHandle::close`], stream drop, bus
//!   shutdown, or when the bus reports lost events for the session.
//!   Registrations are removed immediately so no new events are
//!   accepted; an in-flight projection is allowed to finish.
//! - **Closed**: terminal.
//!
//! The bus only ever holds a queue sender for a session, never the session
//! itself, so a registration cannot outlive the state it points at.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use futures_util::{FutureExt, Stream};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::bus::{ChannelListener, EventBus, EventListener, ListenerHandle, ListenerQueue};
use crate::context::{RequestArgs, RequestContext};
use crate::engine::Counters;
use crate::error::SubscriptionError;
use crate::field::{ResolveInput, SubscriptionFieldSpec};
use crate::filter::FilterInput;
use crate::topic::TopicSet;

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Resolving topics and registering listeners.
    Initializing,
    /// Receiving and projecting events.
    Active,
    /// No longer accepting events; finishing in-flight work.
    Draining,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        }
    }

    fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Initializing, SessionState::Active)
                | (SessionState::Initializing, SessionState::Closed)
                | (SessionState::Active, SessionState::Draining)
                | (SessionState::Draining, SessionState::Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit unsubscribe through [`SessionHandle::close`].
    ClientCancelled,
    /// The stream was dropped by the transport (client stop or disconnect).
    Dropped,
    /// The bus shut down and released all listeners.
    BusShutdown,
    /// The bus lost events for this session's listener.
    Lagged,
}

impl CloseReason {
    /// Returns the string representation of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientCancelled => "client_cancelled",
            CloseReason::Dropped => "dropped",
            CloseReason::BusShutdown => "bus_shutdown",
            CloseReason::Lagged => "lagged",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct SessionShared {
    id: SessionId,
    field: String,
    topics: TopicSet,
    state: Mutex<SessionState>,
    close_reason: Mutex<Option<CloseReason>>,
    registrations: Mutex<Vec<ListenerHandle>>,
    close_requested: Notify,
    bus: Arc<dyn EventBus>,
    counters: Arc<Counters>,
}

impl SessionShared {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn transition(&self, next: SessionState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return false;
        }
        trace!(session_id = %self.id, from = %*state, to = %next, "Session state change");
        *state = next;
        true
    }

    fn release_registrations(&self) {
        let handles = std::mem::take(&mut *self.registrations.lock());
        for handle in &handles {
            self.bus.unsubscribe(handle);
        }
    }

    /// Active → Draining. Returns false if the session was not active.
    fn begin_drain(&self, reason: CloseReason) -> bool {
        if !self.transition(SessionState::Draining) {
            return false;
        }
        *self.close_reason.lock() = Some(reason);
        self.release_registrations();
        self.close_requested.notify_one();
        debug!(
            session_id = %self.id,
            field = %self.field,
            reason = %reason,
            "Session draining"
        );
        true
    }

    /// Draining → Closed. Idempotent.
    fn finish(&self) {
        if !self.transition(SessionState::Closed) {
            return;
        }
        self.release_registrations();
        self.counters.session_closed();
        debug!(
            session_id = %self.id,
            field = %self.field,
            reason = ?*self.close_reason.lock(),
            "Session closed"
        );
    }
}

/// Clonable control handle for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Subscription field the session serves.
    pub fn field(&self) -> &str {
        &self.shared.field
    }

    /// Topics the session listens to.
    pub fn topics(&self) -> &TopicSet {
        &self.shared.topics
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Reason recorded when the session left `Active`.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.shared.close_reason.lock()
    }

    /// Unsubscribe: stop accepting events and end the stream.
    ///
    /// Safe to call concurrently with an in-flight delivery and more than once.
    pub fn close(&self) {
        self.shared.begin_drain(CloseReason::ClientCancelled);
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("field", &self.shared.field)
            .field("state", &self.state())
            .finish()
    }
}

/// Closes the session when the stream is dropped.
struct SessionGuard {
    shared: Arc<SessionShared>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.shared.begin_drain(CloseReason::Dropped);
        self.shared.finish();
    }
}

/// Lazy, unbounded sequence of projected results for one session.
///
/// Dropping the stream closes the session.
pub struct SubscriptionStream {
    handle: SessionHandle,
    inner: Pin<Box<dyn Stream<Item = Value> + Send>>,
}

impl SubscriptionStream {
    /// Control handle for this session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.handle.id()
    }
}

impl Stream for SubscriptionStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for SubscriptionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Initializing work: resolve topics and install one registration per topic.
///
/// On failure every registration made so far is removed again.
fn register(
    bus: &dyn EventBus,
    id: SessionId,
    field: &str,
    spec: &SubscriptionFieldSpec,
    args: &RequestArgs,
    context: &RequestContext,
    max_topics: usize,
) -> Result<(TopicSet, Vec<ListenerHandle>, ListenerQueue), SubscriptionError> {
    let topics = spec.topics().resolve(field, args, context)?;

    if topics.len() > max_topics {
        return Err(SubscriptionError::TooManyTopics {
            field: field.to_string(),
            actual: topics.len(),
            max: max_topics,
        });
    }

    let (listener, receiver) = ChannelListener::new();
    let listener: Arc<dyn EventListener> = Arc::new(listener);

    let mut registrations = Vec::with_capacity(topics.len());
    for topic in &topics {
        match bus.subscribe(topic, listener.clone()) {
            Ok(handle) => registrations.push(handle),
            Err(source) => {
                for handle in &registrations {
                    bus.unsubscribe(handle);
                }
                warn!(
                    session_id = %id,
                    field,
                    topic = %topic,
                    error = %source,
                    "Listener registration failed, rolled back"
                );
                return Err(SubscriptionError::Registration {
                    topic: topic.clone(),
                    source,
                });
            }
        }
    }
    // `listener` drops here, so only the bus keeps it alive.
    Ok((topics, registrations, receiver))
}

/// Open a session: resolve topics, register listeners and build the stream.
pub(crate) fn open(
    bus: Arc<dyn EventBus>,
    counters: Arc<Counters>,
    spec: &SubscriptionFieldSpec,
    args: RequestArgs,
    context: RequestContext,
    max_topics: usize,
) -> Result<SubscriptionStream, SubscriptionError> {
    let id = SessionId::new();
    let field = spec.name().to_string();
    let mut state = SessionState::Initializing;
    trace!(session_id = %id, field = %field, state = %state, "Opening session");

    let (topics, registrations, mut receiver) =
        match register(bus.as_ref(), id, &field, spec, &args, &context, max_topics) {
            Ok(registered) => registered,
            Err(e) => {
                if state.can_transition_to(SessionState::Closed) {
                    state = SessionState::Closed;
                }
                counters.session_rejected();
                debug!(
                    session_id = %id,
                    field = %field,
                    state = %state,
                    error = %e,
                    "Session closed before activation"
                );
                return Err(e);
            }
        };

    let shared = Arc::new(SessionShared {
        id,
        field,
        topics,
        state: Mutex::new(state),
        close_reason: Mutex::new(None),
        registrations: Mutex::new(registrations),
        close_requested: Notify::new(),
        bus,
        counters,
    });
    shared.transition(SessionState::Active);
    shared.counters.session_opened();

    debug!(
        session_id = %shared.id,
        field = %shared.field,
        topics = ?shared.topics.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        "Session active"
    );

    let filter = spec.filter().clone();
    let resolver = spec.resolver().clone();
    let args = Arc::new(args);
    let context = Arc::new(context);
    let guard = SessionGuard {
        shared: shared.clone(),
    };

    let inner = stream! {
        let _guard = guard;
        let shared = _guard.shared.clone();

        loop {
            if shared.state() != SessionState::Active {
                break;
            }

            let event = tokio::select! {
                biased;
                _ = shared.close_requested.notified() => break,
                next = receiver.recv() => match next {
                    Some(event) => event,
                    None => {
                        match receiver.overflow() {
                            Some(overflow) => {
                                warn!(
                                    session_id = %shared.id,
                                    field = %shared.field,
                                    topic = %overflow.topic,
                                    missed = overflow.missed,
                                    "Session fell behind the bus, closing"
                                );
                                shared.begin_drain(CloseReason::Lagged);
                            }
                            None => {
                                shared.begin_drain(CloseReason::BusShutdown);
                            }
                        }
                        break;
                    }
                },
            };

            let accepted = filter.accepts(
                &shared.field,
                &FilterInput {
                    topic: &event.topic,
                    payload: &event.payload,
                    args: &args,
                    context: &context,
                },
            );
            if !accepted {
                continue;
            }

            let input = ResolveInput {
                topic: event.topic.clone(),
                payload: event.payload.clone(),
                published_at: event.published_at,
                args: args.clone(),
                context: context.clone(),
            };

            match AssertUnwindSafe(resolver.resolve(input)).catch_unwind().await {
                Ok(Ok(value)) => {
                    trace!(
                        session_id = %shared.id,
                        topic = %event.topic,
                        "Emitting subscription result"
                    );
                    yield value;
                }
                Ok(Err(e)) => {
                    warn!(
                        session_id = %shared.id,
                        field = %shared.field,
                        topic = %event.topic,
                        error = %e,
                        "Projection failed, dropping event"
                    );
                }
                Err(_) => {
                    error!(
                        session_id = %shared.id,
                        field = %shared.field,
                        topic = %event.topic,
                        "Field resolver panicked, dropping event"
                    );
                }
            }
        }

        // Queued events that were never processed are discarded with the receiver.
        receiver.close();
        shared.finish();
    };

    Ok(SubscriptionStream {
        handle: SessionHandle { shared },
        inner: Box::pin(inner),
    })
}
