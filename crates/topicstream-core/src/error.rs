//! Error types for the subscription routing engine.
//!
//! Errors are split by where they surface:
//!
//! - [`ConfigurationError`] - schema-build time, fatal to startup
//! - [`SubscriptionError`] - subscribe time, fails only the offending operation
//! - [`PublishError`] - returned to the publishing caller
//! - [`ListenerError`], [`FilterEvaluationError`], [`ProjectionError`] - local to
//!   one event for one session; logged and never propagated

use crate::topic::Topic;

/// Invalid subscription field declaration, detected before serving requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// A static topic spec was declared without any topics.
    #[error("subscription field '{field}' of '{owner}' declares an empty topic list")]
    EmptyTopics {
        /// Subscription field name.
        field: String,
        /// Resolver (owner type) that declares the field.
        owner: String,
    },

    /// A topic name is empty.
    #[error("subscription field '{field}' of '{owner}' declares an empty topic name")]
    BlankTopic {
        /// Subscription field name.
        field: String,
        /// Resolver (owner type) that declares the field.
        owner: String,
    },

    /// Two subscription fields share the same name.
    #[error("subscription field '{0}' is declared more than once")]
    DuplicateField(String),
}

impl ConfigurationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            Self::EmptyTopics { field, .. } | Self::BlankTopic { field, .. } => field,
            Self::DuplicateField(field) => field,
        }
    }
}

/// Errors that terminate a single subscribe operation.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// A dynamic topic function produced no topics.
    #[error("subscription field '{field}' resolved to an empty topic set")]
    MissingTopics {
        /// Subscription field name.
        field: String,
    },

    /// A dynamic topic function panicked.
    #[error("topic function of subscription field '{field}' failed: {message}")]
    TopicResolution {
        /// Subscription field name.
        field: String,
        /// Panic message.
        message: String,
    },

    /// A dynamic topic function produced more topics than allowed.
    #[error("subscription field '{field}' resolved to {actual} topics (max {max})")]
    TooManyTopics {
        /// Subscription field name.
        field: String,
        /// Number of distinct topics resolved.
        actual: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Registering a listener on the bus failed; prior registrations were rolled back.
    #[error("failed to register listener for topic '{topic}': {source}")]
    Registration {
        /// Topic whose registration failed.
        topic: Topic,
        /// Underlying bus error.
        #[source]
        source: BusError,
    },

    /// The field declaration itself is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl SubscriptionError {
    /// Returns a stable error code for transport-level error extensions.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingTopics { .. } => "MISSING_TOPICS",
            Self::TopicResolution { .. } => "TOPIC_RESOLUTION_FAILED",
            Self::TooManyTopics { .. } => "TOO_MANY_TOPICS",
            Self::Registration { .. } => "REGISTRATION_FAILED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Errors returned to the caller of `publish`.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The bus has been shut down (or was never started).
    #[error("event bus is not available")]
    BusClosed,

    /// The payload could not be converted to JSON.
    #[error("failed to serialize payload for topic '{topic}': {source}")]
    Serialization {
        /// Target topic.
        topic: Topic,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the bus when mutating its registrations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus no longer accepts registrations.
    #[error("event bus is closed")]
    Closed,

    /// The backend could not start a delivery worker.
    #[error("event bus backend error: {0}")]
    Backend(String),
}

/// Failure of a single listener callback.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The receiving side of the listener is gone.
    #[error("listener receiver is closed")]
    Disconnected,

    /// The listener failed for another reason.
    #[error("listener failed: {0}")]
    Failed(String),
}

/// A filter predicate failed (error or panic); the event is treated as rejected.
#[derive(Debug, thiserror::Error)]
#[error("filter for field '{field}' failed on topic '{topic}': {message}")]
pub struct FilterEvaluationError {
    /// Subscription field name.
    pub field: String,
    /// Topic of the rejected event.
    pub topic: Topic,
    /// Failure description.
    pub message: String,
}

/// A field resolver failed to project an event payload.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// The payload did not have the shape the resolver expects.
    #[error("unexpected payload shape: {0}")]
    InvalidPayload(String),

    /// The resolver failed.
    #[error("projection failed: {0}")]
    Failed(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProjectionError {
    /// Create an invalid-payload error from a string.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Create a failure from a string.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<serde_json::Error> for ProjectionError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}
