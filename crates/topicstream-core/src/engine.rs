//! Subscription engine: the two entry points schema glue talks to.
//!
//! - [`SubscriptionEngine::create_session`] opens a session for one subscribe
//!   operation and returns its result stream.
//! - [`SubscriptionEngine::get_publisher`] hands out publisher adapters for
//!   mutation and query code.
//!
//! The engine owns nothing but a reference to the bus and a few counters, so
//! it is cheap to clone into request data.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tracing::info;

use crate::bus::{EventBus, build_event_bus};
use crate::config::SubscriptionsConfig;
use crate::context::{RequestArgs, RequestContext};
use crate::error::SubscriptionError;
use crate::field::SubscriptionFieldSpec;
use crate::publisher::{BoundPublisher, Publisher, PublisherHandle};
use crate::session::{self, SubscriptionStream};
use crate::topic::Topic;

/// Engine-wide counters shared with sessions and publishers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    active_sessions: AtomicUsize,
    sessions_opened: AtomicU64,
    sessions_rejected: AtomicU64,
    events_published: AtomicU64,
}

impl Counters {
    pub(crate) fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> EngineStats {
        EngineStats {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Sessions that have not reached `Closed`.
    pub active_sessions: usize,
    /// Sessions opened since start.
    pub sessions_opened: u64,
    /// Subscribe operations that closed before becoming active.
    pub sessions_rejected: u64,
    /// Events accepted by the bus through engine publishers.
    pub events_published: u64,
}

/// Creates subscription sessions and publishers over one event bus.
#[derive(Clone)]
pub struct SubscriptionEngine {
    bus: Arc<dyn EventBus>,
    counters: Arc<Counters>,
    max_topics_per_session: usize,
}

impl SubscriptionEngine {
    /// Create an engine over an existing bus.
    pub fn new(bus: Arc<dyn EventBus>, config: &SubscriptionsConfig) -> Self {
        Self {
            bus,
            counters: Arc::new(Counters::default()),
            max_topics_per_session: config.max_topics_per_session.max(1),
        }
    }

    /// Build the configured bus backend and an engine over it.
    pub fn from_config(config: &SubscriptionsConfig) -> Self {
        let engine = Self::new(build_event_bus(&config.bus), config);
        info!(
            backend = engine.bus.name(),
            max_topics_per_session = engine.max_topics_per_session,
            "Subscription engine created"
        );
        engine
    }

    /// The shared event bus.
    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Open a session for one subscribe operation.
    ///
    /// Topics are resolved once, here, with `args` and `context`; both are
    /// captured for the session's lifetime and handed to the filter and the
    /// field resolver for every event.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::Configuration`] if the field declaration is invalid
    /// - [`SubscriptionError::MissingTopics`] if a dynamic spec resolves to nothing
    /// - [`SubscriptionError::TopicResolution`] if the topic function panics
    /// - [`SubscriptionError::TooManyTopics`] if it resolves to too many topics
    /// - [`SubscriptionError::Registration`] if the bus refuses a listener
    ///
    /// None of these affect other sessions.
    pub fn create_session(
        &self,
        spec: &SubscriptionFieldSpec,
        args: RequestArgs,
        context: RequestContext,
    ) -> Result<SubscriptionStream, SubscriptionError> {
        spec.validate()?;
        session::open(
            self.bus.clone(),
            self.counters.clone(),
            spec,
            args,
            context,
            self.max_topics_per_session,
        )
    }

    /// Generic publish-by-topic adapter.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.bus.clone(), self.counters.clone())
    }

    /// Adapter bound to `topic`.
    pub fn bound_publisher(&self, topic: impl Into<Topic>) -> BoundPublisher {
        self.publisher().bind(topic)
    }

    /// Bound adapter when a topic is given, generic adapter otherwise.
    pub fn get_publisher(&self, bound_topic: Option<Topic>) -> PublisherHandle {
        match bound_topic {
            Some(topic) => self.bound_publisher(topic).into(),
            None => self.publisher().into(),
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }

    /// Shut the bus down; every active session ends its stream.
    pub fn shutdown(&self) {
        info!(stats = ?self.stats(), "Shutting down subscription engine");
        self.bus.shutdown();
    }
}

impl std::fmt::Debug for SubscriptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionEngine")
            .field("bus", &self.bus.name())
            .field("max_topics_per_session", &self.max_topics_per_session)
            .field("stats", &self.stats())
            .finish()
    }
}
