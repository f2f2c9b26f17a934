//! # topicstream-core
//!
//! Topic-addressed event routing for GraphQL subscriptions.
//!
//! A backend publishes named-topic events; every active subscription session
//! receives the events on its topics that pass its filter, projected through
//! the field's resolver.
//!
//! ## Overview
//!
//! ```text
//!  subscribe ─► TopicSpec::resolve ─► EventBus::subscribe (one per topic)
//!                                           │
//!  mutation ─► Publisher::publish ─► EventBus::publish ─► session queue
//!                                                            │
//!                                  PayloadFilter ─► FieldResolver ─► stream
//! ```
//!
//! - Publishing never blocks on listener processing.
//! - A failing listener, filter or resolver affects only its own session.
//! - Each session observes events on a topic in publish order.
//!
//! ## Modules
//!
//! - [`bus`] - Event bus trait and in-process backends
//! - [`topic`] - Topics and topic resolution
//! - [`filter`] - Per-event payload filters
//! - [`field`] - Subscription field declarations and resolvers
//! - [`session`] - Session state machine and result streams
//! - [`publisher`] - Publisher adapters
//! - [`engine`] - Entry points for schema glue
//! - [`config`] - Configuration options
//! - [`error`] - Error types

pub mod bus;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod field;
pub mod filter;
pub mod publisher;
pub mod session;
pub mod topic;

// Re-export main types
pub use bus::{
    BroadcastEventBus, ChannelListener, EventBus, EventListener, InMemoryEventBus, ListenerHandle,
    ListenerId, ListenerQueue, Overflow, build_event_bus,
};
pub use config::{BusConfig, EventBusKind, SubscriptionsConfig};
pub use context::{ContextBuilderError, RequestArgs, RequestContext, RequestContextBuilder};
pub use engine::{EngineStats, SubscriptionEngine};
pub use error::{
    BusError, ConfigurationError, FilterEvaluationError, ListenerError, ProjectionError,
    PublishError, SubscriptionError,
};
pub use event::{Event, Payload};
pub use field::{FieldResolver, ResolveInput, SubscriptionFieldSpec, SubscriptionFieldSpecBuilder};
pub use filter::{FilterFn, FilterInput, PayloadFilter};
pub use publisher::{BoundPublisher, Publisher, PublisherHandle};
pub use session::{CloseReason, SessionHandle, SessionId, SessionState, SubscriptionStream};
pub use topic::{Topic, TopicFn, TopicSelection, TopicSet, TopicSpec};

/// Result type for subscribe operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;
