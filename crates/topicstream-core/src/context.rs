//! Per-operation request data handed to topic functions, filters and resolvers.
//!
//! The context is captured once when a subscription session starts and stays
//! the same for the whole lifetime of that session.
//!
//! # Example
//!
//! ```
//! use topicstream_core::RequestContext;
//!
//! let context = RequestContext::builder()
//!     .with_request_id("req-123")
//!     .with_connection_id("conn-1")
//!     .with_user_id("user-7")
//!     .build()
//!     .unwrap();
//! assert!(context.is_authenticated());
//! ```

use serde_json::{Map, Value};

/// Coerced arguments of the subscription field, keyed by argument name.
pub type RequestArgs = Map<String, Value>;

/// Request-scoped context shared with topic functions, filters and resolvers.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    /// Request ID for tracing and correlation.
    pub request_id: String,

    /// Transport connection that owns the operation (e.g. a WebSocket).
    pub connection_id: Option<String>,

    /// Authenticated user, if any.
    pub user_id: Option<String>,

    /// Free-form values supplied by the transport (connection-init payload, headers).
    pub extra: Map<String, Value>,
}

impl RequestContext {
    /// Context for an unauthenticated operation with a fresh request ID.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            connection_id: None,
            user_id: None,
            extra: Map::new(),
        }
    }

    /// Returns whether the operation is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Looks up a transport-supplied value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Creates a new builder for RequestContext.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Builder for constructing RequestContext.
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    request_id: Option<String>,
    connection_id: Option<String>,
    user_id: Option<String>,
    extra: Map<String, Value>,
}

impl RequestContextBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request ID.
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Sets the owning connection ID.
    #[must_use]
    pub fn with_connection_id(mut self, id: impl Into<String>) -> Self {
        self.connection_id = Some(id.into());
        self
    }

    /// Sets the authenticated user.
    #[must_use]
    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    /// Sets an optional authenticated user.
    #[must_use]
    pub fn with_user(mut self, id: Option<String>) -> Self {
        self.user_id = id;
        self
    }

    /// Adds a transport-supplied value.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Builds the RequestContext.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<RequestContext, ContextBuilderError> {
        let request_id = self
            .request_id
            .filter(|id| !id.is_empty())
            .ok_or(ContextBuilderError::MissingField("request_id"))?;

        Ok(RequestContext {
            request_id,
            connection_id: self.connection_id,
            user_id: self.user_id,
            extra: self.extra,
        })
    }
}

/// Errors that can occur when building a RequestContext.
#[derive(Debug, thiserror::Error)]
pub enum ContextBuilderError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}
