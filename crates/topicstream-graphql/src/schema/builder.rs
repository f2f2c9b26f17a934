//! Schema builder for subscription-enabled dynamic schemas.
//!
//! Subscription declarations are validated before any GraphQL type is built,
//! so an invalid declaration stops startup with an error naming the field and
//! its owner.

use std::collections::HashSet;

use async_graphql::dynamic::{Field, FieldFuture, Object, Schema, Subscription, TypeRef};
use async_graphql::Value;
use topicstream_core::{ConfigurationError, SubscriptionEngine};
use tracing::{debug, info};

use super::fields::SubscriptionFieldDef;
use crate::config::GraphQLConfig;
use crate::error::GraphQLError;

const QUERY: &str = "Query";
const MUTATION: &str = "Mutation";
const SUBSCRIPTION: &str = "Subscription";

/// Builds a dynamic schema whose subscription fields are served by the engine.
///
/// # Example
///
/// ```ignore
/// let schema = SubscriptionSchemaBuilder::new(engine, GraphQLConfig::default())
///     .register(json_object_type("Notification", [("id", TypeRef::named_nn(TypeRef::INT))]))
///     .subscription(SubscriptionFieldDef::new(spec, TypeRef::named_nn("Notification")))
///     .mutation_field(publish_field)
///     .build()?;
/// ```
pub struct SubscriptionSchemaBuilder {
    engine: SubscriptionEngine,
    config: GraphQLConfig,
    subscriptions: Vec<SubscriptionFieldDef>,
    query_fields: Vec<Field>,
    mutation_fields: Vec<Field>,
    types: Vec<Object>,
}

impl SubscriptionSchemaBuilder {
    /// Creates a new schema builder.
    #[must_use]
    pub fn new(engine: SubscriptionEngine, config: GraphQLConfig) -> Self {
        Self {
            engine,
            config,
            subscriptions: Vec::new(),
            query_fields: Vec::new(),
            mutation_fields: Vec::new(),
            types: Vec::new(),
        }
    }

    /// Adds a subscription field.
    #[must_use]
    pub fn subscription(mut self, def: SubscriptionFieldDef) -> Self {
        self.subscriptions.push(def);
        self
    }

    /// Adds a field to the Query root.
    #[must_use]
    pub fn query_field(mut self, field: Field) -> Self {
        self.query_fields.push(field);
        self
    }

    /// Adds a field to the Mutation root.
    #[must_use]
    pub fn mutation_field(mut self, field: Field) -> Self {
        self.mutation_fields.push(field);
        self
    }

    /// Registers an output type.
    #[must_use]
    pub fn register(mut self, object: Object) -> Self {
        self.types.push(object);
        self
    }

    /// Checks every subscription declaration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`]: an empty or blank static topic
    /// list, or a field name declared twice.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::new();
        for def in &self.subscriptions {
            def.spec.validate()?;
            if !seen.insert(def.name()) {
                return Err(ConfigurationError::DuplicateField(def.name().to_string()));
            }
        }
        Ok(())
    }

    /// Builds the GraphQL schema.
    ///
    /// The schema carries the engine as data, so resolvers can publish through
    /// [`PublisherContextExt`](crate::PublisherContextExt).
    ///
    /// # Errors
    ///
    /// Returns [`GraphQLError::Configuration`] for an invalid subscription
    /// declaration and [`GraphQLError::SchemaBuildFailed`] if async-graphql
    /// rejects the assembled schema.
    pub fn build(self) -> Result<Schema, GraphQLError> {
        self.validate()?;
        debug!(
            subscriptions = self.subscriptions.len(),
            queries = self.query_fields.len(),
            mutations = self.mutation_fields.len(),
            "Starting GraphQL schema build"
        );

        let mutation = (!self.mutation_fields.is_empty()).then_some(MUTATION);
        let subscription = (!self.subscriptions.is_empty()).then_some(SUBSCRIPTION);
        let mut schema_builder = Schema::build(QUERY, mutation, subscription);

        for object in self.types {
            schema_builder = schema_builder.register(object);
        }

        let query = self
            .query_fields
            .into_iter()
            .fold(Object::new(QUERY).field(active_subscriptions_field()), Object::field);
        schema_builder = schema_builder.register(query);

        if mutation.is_some() {
            let object = self
                .mutation_fields
                .into_iter()
                .fold(Object::new(MUTATION), Object::field);
            schema_builder = schema_builder.register(object);
        }

        if subscription.is_some() {
            let field_names: Vec<String> = self
                .subscriptions
                .iter()
                .map(|def| def.name().to_string())
                .collect();
            let object = self
                .subscriptions
                .into_iter()
                .fold(Subscription::new(SUBSCRIPTION), |object, def| {
                    object.field(def.into_field(self.engine.clone()))
                });
            schema_builder = schema_builder.register(object);
            info!(fields = ?field_names, "Subscription fields registered");
        }

        let mut schema_builder = schema_builder
            .data(self.engine.clone())
            .limit_depth(self.config.max_depth)
            .limit_complexity(self.config.max_complexity);

        if !self.config.introspection {
            schema_builder = schema_builder.disable_introspection();
        }

        let schema = schema_builder
            .finish()
            .map_err(|e| GraphQLError::SchemaBuildFailed(e.to_string()))?;

        debug!("GraphQL schema build complete");
        Ok(schema)
    }
}

/// `activeSubscriptions: Int!` on the Query root.
fn active_subscriptions_field() -> Field {
    Field::new(
        "activeSubscriptions",
        TypeRef::named_nn(TypeRef::INT),
        |ctx| {
            FieldFuture::new(async move {
                let engine = ctx.data::<SubscriptionEngine>()?;
                let active = i64::try_from(engine.stats().active_sessions).unwrap_or(i64::MAX);
                Ok(Some(Value::from(active)))
            })
        },
    )
    .description("Number of subscription sessions currently open")
}
