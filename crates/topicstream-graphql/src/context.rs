//! Access to engine services from inside resolvers.
//!
//! The schema carries the [`SubscriptionEngine`] as data. Mutation and query
//! resolvers obtain publishers through [`PublisherContextExt`], the same way
//! they reach any other injected dependency.
//!
//! # Example
//!
//! ```ignore
//! use topicstream_graphql::PublisherContextExt;
//!
//! Field::new("publish", TypeRef::named_nn(TypeRef::BOOLEAN), |ctx| {
//!     FieldFuture::new(async move {
//!         ctx.bound_publisher("NOTIFICATIONS")?.publish(json!({"id": 1}))?;
//!         Ok(Some(Value::Boolean(true)))
//!     })
//! })
//! ```

use async_graphql::Context;
use topicstream_core::{
    BoundPublisher, Publisher, PublisherHandle, RequestContext, SubscriptionEngine, Topic,
};

use crate::error::GraphQLError;

/// Publisher injection for resolver contexts.
pub trait PublisherContextExt {
    /// The subscription engine stored in schema data.
    fn engine(&self) -> async_graphql::Result<&SubscriptionEngine>;

    /// Generic publish-by-topic adapter.
    fn publisher(&self) -> async_graphql::Result<Publisher> {
        Ok(self.engine()?.publisher())
    }

    /// Adapter bound to `topic`.
    fn bound_publisher(&self, topic: impl Into<Topic>) -> async_graphql::Result<BoundPublisher> {
        Ok(self.engine()?.bound_publisher(topic))
    }

    /// Bound adapter when a topic is given, generic adapter otherwise.
    fn get_publisher(&self, bound_topic: Option<Topic>) -> async_graphql::Result<PublisherHandle> {
        Ok(self.engine()?.get_publisher(bound_topic))
    }
}

impl PublisherContextExt for Context<'_> {
    fn engine(&self) -> async_graphql::Result<&SubscriptionEngine> {
        self.data::<SubscriptionEngine>()
            .map_err(|_| GraphQLError::ContextUnavailable("SubscriptionEngine").into_graphql_error())
    }
}

/// Context for one operation.
///
/// Connection-level data (WebSocket init) supplies connection and user ids;
/// every operation still gets its own request id.
pub(crate) fn operation_context(ctx: &Context<'_>) -> RequestContext {
    match ctx.data_opt::<RequestContext>() {
        Some(base) if base.connection_id.is_some() => RequestContext {
            request_id: uuid::Uuid::new_v4().to_string(),
            ..base.clone()
        },
        Some(base) => base.clone(),
        None => RequestContext::anonymous(),
    }
}
