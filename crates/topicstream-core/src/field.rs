//! Subscription field specification.
//!
//! A [`SubscriptionFieldSpec`] is the immutable record schema construction
//! hands to the engine: which topics to listen to, which events to keep and
//! how to project a payload into the field's result.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use topicstream_core::SubscriptionFieldSpec;
//!
//! let spec = SubscriptionFieldSpec::builder("subscriptionWithFilter", "SampleResolver")
//!     .topic("NOTIFICATIONS")
//!     .filter(|input| input.payload["id"].as_i64().unwrap_or(1) % 2 == 0)
//!     .project(|input| Ok(json!({ "id": input.payload["id"], "message": input.payload["message"] })))
//!     .build();
//!
//! assert!(spec.validate().is_ok());
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use crate::context::{RequestArgs, RequestContext};
use crate::error::{ConfigurationError, ProjectionError};
use crate::event::Payload;
use crate::filter::{FilterInput, PayloadFilter};
use crate::topic::{Topic, TopicSelection, TopicSpec};

/// Input handed to a field resolver for one accepted event.
#[derive(Debug, Clone)]
pub struct ResolveInput {
    /// Topic the event was published to.
    pub topic: Topic,
    /// Raw event payload.
    pub payload: Payload,
    /// Publish timestamp.
    pub published_at: OffsetDateTime,
    /// Arguments captured when the session started.
    pub args: Arc<RequestArgs>,
    /// Context captured when the session started.
    pub context: Arc<RequestContext>,
}

/// Projects a raw payload into the subscription field's result.
///
/// Errors drop the event for this session only.
#[async_trait]
pub trait FieldResolver: Send + Sync {
    /// Project one accepted event.
    async fn resolve(&self, input: ResolveInput) -> Result<Value, ProjectionError>;
}

/// Resolver that returns the payload unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadResolver;

#[async_trait]
impl FieldResolver for PayloadResolver {
    async fn resolve(&self, input: ResolveInput) -> Result<Value, ProjectionError> {
        Ok(input.payload.as_ref().clone())
    }
}

/// Adapter for async closures.
pub struct AsyncFnResolver<F>(pub F);

#[async_trait]
impl<F, Fut> FieldResolver for AsyncFnResolver<F>
where
    F: Fn(ResolveInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ProjectionError>> + Send,
{
    async fn resolve(&self, input: ResolveInput) -> Result<Value, ProjectionError> {
        (self.0)(input).await
    }
}

/// Adapter for synchronous closures.
pub struct FnResolver<F>(pub F);

#[async_trait]
impl<F> FieldResolver for FnResolver<F>
where
    F: Fn(ResolveInput) -> Result<Value, ProjectionError> + Send + Sync,
{
    async fn resolve(&self, input: ResolveInput) -> Result<Value, ProjectionError> {
        (self.0)(input)
    }
}

/// Immutable declaration of one subscription field.
#[derive(Clone)]
pub struct SubscriptionFieldSpec {
    name: String,
    owner: String,
    description: Option<String>,
    topics: TopicSpec,
    filter: PayloadFilter,
    resolver: Arc<dyn FieldResolver>,
}

impl SubscriptionFieldSpec {
    /// Start declaring field `name` owned by resolver type `owner`.
    pub fn builder(
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> SubscriptionFieldSpecBuilder {
        SubscriptionFieldSpecBuilder::new(name, owner)
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolver type that declares the field.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Field description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Topic spec.
    pub fn topics(&self) -> &TopicSpec {
        &self.topics
    }

    /// Payload filter.
    pub fn filter(&self) -> &PayloadFilter {
        &self.filter
    }

    /// Field resolver.
    pub fn resolver(&self) -> &Arc<dyn FieldResolver> {
        &self.resolver
    }

    /// Schema-build validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] naming the field and its owner when a
    /// static topic list is empty or contains a blank topic.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.topics.validate(&self.name, &self.owner)
    }
}

impl std::fmt::Debug for SubscriptionFieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionFieldSpec")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("topics", &self.topics)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SubscriptionFieldSpec`].
pub struct SubscriptionFieldSpecBuilder {
    name: String,
    owner: String,
    description: Option<String>,
    topics: Vec<Topic>,
    dynamic: Option<TopicSpec>,
    filter: PayloadFilter,
    resolver: Arc<dyn FieldResolver>,
}

impl SubscriptionFieldSpecBuilder {
    /// Creates a new builder. Without topics the built spec fails validation.
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            description: None,
            topics: Vec::new(),
            dynamic: None,
            filter: PayloadFilter::default(),
            resolver: Arc::new(PayloadResolver),
        }
    }

    /// Sets the field description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds one static topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<Topic>) -> Self {
        self.topics.push(topic.into());
        self
    }

    /// Adds several static topics.
    #[must_use]
    pub fn topics<I, T>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Topic>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    /// Computes topics per operation; replaces any static topics.
    #[must_use]
    pub fn dynamic_topics<F, S>(mut self, f: F) -> Self
    where
        F: Fn(&RequestArgs, &RequestContext) -> S + Send + Sync + 'static,
        S: Into<TopicSelection>,
    {
        self.dynamic = Some(TopicSpec::dynamic(f));
        self
    }

    /// Sets an infallible filter predicate.
    #[must_use]
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FilterInput<'_>) -> bool + Send + Sync + 'static,
    {
        self.filter = PayloadFilter::new(predicate);
        self
    }

    /// Sets a fallible filter predicate.
    #[must_use]
    pub fn try_filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FilterInput<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.filter = PayloadFilter::try_new(predicate);
        self
    }

    /// Sets the field resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: impl FieldResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Sets an async projection closure.
    #[must_use]
    pub fn resolve<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ResolveInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ProjectionError>> + Send + 'static,
    {
        self.resolver(AsyncFnResolver(f))
    }

    /// Sets a synchronous projection closure.
    #[must_use]
    pub fn project<F>(self, f: F) -> Self
    where
        F: Fn(ResolveInput) -> Result<Value, ProjectionError> + Send + Sync + 'static,
    {
        self.resolver(FnResolver(f))
    }

    /// Builds the spec.
    pub fn build(self) -> SubscriptionFieldSpec {
        let topics = self
            .dynamic
            .unwrap_or_else(|| TopicSpec::Static(self.topics));

        SubscriptionFieldSpec {
            name: self.name,
            owner: self.owner,
            description: self.description,
            topics,
            filter: self.filter,
            resolver: self.resolver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(payload: Value) -> ResolveInput {
        ResolveInput {
            topic: Topic::from("T"),
            payload: Arc::new(payload),
            published_at: OffsetDateTime::now_utc(),
            args: Arc::new(RequestArgs::new()),
            context: Arc::new(RequestContext::anonymous()),
        }
    }

    #[test]
    fn test_builder_without_topics_fails_validation() {
        let spec = SubscriptionFieldSpec::builder("normalSubscription", "SampleResolver").build();
        let err = spec.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::EmptyTopics {
                field: "normalSubscription".into(),
                owner: "SampleResolver".into(),
            }
        );
    }

    #[test]
    fn test_builder_static_and_dynamic() {
        let spec = SubscriptionFieldSpec::builder("f", "R")
            .topics(["A", "B"])
            .description("two topics")
            .build();
        assert!(!spec.topics().is_dynamic());
        assert_eq!(spec.description(), Some("two topics"));
        assert!(spec.filter().is_accept_all());

        let spec = SubscriptionFieldSpec::builder("f", "R")
            .dynamic_topics(|args: &RequestArgs, _: &RequestContext| {
                args.get("topic").and_then(Value::as_str).map(str::to_string)
            })
            .build();
        assert!(spec.topics().is_dynamic());
        assert!(spec.validate().is_ok());
    }

    #[tokio::test]
    async fn test_default_resolver_returns_payload() {
        let spec = SubscriptionFieldSpec::builder("f", "R").topic("A").build();
        let value = spec.resolver().resolve(input(json!({"a": 1}))).await.unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_sync_and_async_resolvers() {
        let spec = SubscriptionFieldSpec::builder("f", "R")
            .topic("A")
            .project(|input| Ok(json!({ "wrapped": input.payload.as_ref().clone() })))
            .build();
        let value = spec.resolver().resolve(input(json!(1))).await.unwrap();
        assert_eq!(value, json!({"wrapped": 1}));

        let spec = SubscriptionFieldSpec::builder("f", "R")
            .topic("A")
            .resolve(|input| async move {
                input
                    .payload
                    .as_f64()
                    .map(|v| json!(v * 2.0))
                    .ok_or_else(|| ProjectionError::invalid_payload("not a number"))
            })
            .build();
        assert_eq!(
            spec.resolver().resolve(input(json!(1.5))).await.unwrap(),
            json!(3.0)
        );
        assert!(spec.resolver().resolve(input(json!("x"))).await.is_err());
    }
}
