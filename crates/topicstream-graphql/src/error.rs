//! Error types for the GraphQL binding.
//!
//! Errors raised while building the schema are fatal to startup. Errors raised
//! while serving an operation are turned into GraphQL errors carrying a stable
//! `extensions.code`.

use async_graphql::ErrorExtensions;
use topicstream_core::{ConfigurationError, PublishError, SubscriptionError};

/// Errors that can occur in the GraphQL layer.
#[derive(Debug, thiserror::Error)]
pub enum GraphQLError {
    /// A subscription field declaration is invalid.
    #[error("Invalid subscription field configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Schema build failed.
    #[error("Failed to build GraphQL schema: {0}")]
    SchemaBuildFailed(String),

    /// A subscribe operation could not be started.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Publishing from a resolver failed.
    #[error("Failed to publish event: {0}")]
    Publish(#[from] PublishError),

    /// Required schema data is missing.
    #[error("{0} is not available in the GraphQL context")]
    ContextUnavailable(&'static str),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GraphQLError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_) | Self::SchemaBuildFailed(_) => 500,
            Self::Subscription(SubscriptionError::Registration { .. }) => 503,
            Self::Subscription(_) => 400,
            Self::Publish(PublishError::BusClosed) => 503,
            Self::Publish(PublishError::Serialization { .. }) => 400,
            Self::ContextUnavailable(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for GraphQL error extensions.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::SchemaBuildFailed(_) => "SCHEMA_BUILD_FAILED",
            Self::Subscription(e) => e.error_code(),
            Self::Publish(PublishError::BusClosed) => "BUS_CLOSED",
            Self::Publish(PublishError::Serialization { .. }) => "SERIALIZATION_ERROR",
            Self::ContextUnavailable(_) => "CONTEXT_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Converts into an `async_graphql::Error` with `extensions.code` set.
    #[must_use]
    pub fn into_graphql_error(self) -> async_graphql::Error {
        let code = self.error_code();
        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| ext.set("code", code))
    }
}
