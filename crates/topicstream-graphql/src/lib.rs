//! # topicstream-graphql
//!
//! Binds topicstream subscription fields onto an async-graphql dynamic schema.
//!
//! ## Overview
//!
//! Each [`SubscriptionFieldDef`] becomes a field on the `Subscription` root.
//! A subscribe operation converts its arguments to JSON, picks up the request
//! context and opens one engine session; the session's stream is the field's
//! result stream. Mutation and query resolvers publish through
//! [`PublisherContextExt`].
//!
//! ## Endpoints
//!
//! - `POST /graphql` - Queries and mutations
//! - `GET /graphql/ws` - Subscriptions over WebSocket
//!
//! ## Configuration
//!
//! Add to `topicstream.toml`:
//!
//! ```toml
//! [graphql]
//! path = "/graphql"
//! ws_path = "/graphql/ws"
//! max_depth = 15
//! max_complexity = 500
//! introspection = true
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Configuration options
//! - [`schema`] - Schema building and subscription fields
//! - [`context`] - Publisher access from resolvers
//! - [`handler`] - Axum HTTP and WebSocket handlers
//! - [`error`] - Error types for GraphQL operations

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod schema;

// Re-export main types
pub use config::GraphQLConfig;
pub use context::PublisherContextExt;
pub use error::GraphQLError;
pub use handler::{GraphQLState, connection_init, graphql_handler, graphql_ws_handler};
pub use schema::{
    SubscriptionFieldDef, SubscriptionSchemaBuilder, json_object_type, json_to_graphql_value,
};

/// Result type for GraphQL operations.
pub type Result<T> = std::result::Result<T, GraphQLError>;
