//! Subscription fields backed by engine sessions.

use std::sync::Arc;

use async_graphql::dynamic::{InputValue, SubscriptionField, SubscriptionFieldFuture, TypeRef};
use futures_util::StreamExt;
use topicstream_core::{SubscriptionEngine, SubscriptionFieldSpec};
use tracing::debug;

use super::types::{json_to_graphql_value, request_args};
use crate::context::operation_context;
use crate::error::GraphQLError;

/// A subscription field declaration plus its GraphQL signature.
pub struct SubscriptionFieldDef {
    /// Routing declaration handed to the engine.
    pub spec: Arc<SubscriptionFieldSpec>,
    /// GraphQL return type of the field.
    pub return_type: TypeRef,
    /// Field arguments.
    pub arguments: Vec<InputValue>,
}

impl SubscriptionFieldDef {
    /// Declare a field returning `return_type`.
    pub fn new(spec: SubscriptionFieldSpec, return_type: TypeRef) -> Self {
        Self {
            spec: Arc::new(spec),
            return_type,
            arguments: Vec::new(),
        }
    }

    /// Adds an argument.
    #[must_use]
    pub fn argument(mut self, input: InputValue) -> Self {
        self.arguments.push(input);
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Builds the dynamic subscription field.
    ///
    /// Every subscribe operation opens one engine session; the session ends
    /// when async-graphql drops the stream (client stop or disconnect).
    pub(crate) fn into_field(self, engine: SubscriptionEngine) -> SubscriptionField {
        let spec = self.spec;
        let mut field = SubscriptionField::new(spec.name().to_string(), self.return_type, {
            let spec = spec.clone();
            move |ctx| {
                let engine = engine.clone();
                let spec = spec.clone();
                let args = request_args(&ctx);
                let context = operation_context(&ctx);

                SubscriptionFieldFuture::new(async move {
                    debug!(
                        field = %spec.name(),
                        request_id = %context.request_id,
                        "Starting subscription"
                    );

                    let stream = engine
                        .create_session(&spec, args, context)
                        .map_err(|e| GraphQLError::from(e).into_graphql_error())?;

                    Ok(stream.map(|value| {
                        Ok::<_, async_graphql::Error>(json_to_graphql_value(value))
                    }))
                })
            }
        });

        if let Some(description) = spec.description() {
            field = field.description(description);
        }
        self.arguments
            .into_iter()
            .fold(field, |field, input| field.argument(input))
    }
}

impl std::fmt::Debug for SubscriptionFieldDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionFieldDef")
            .field("spec", &self.spec)
            .field("return_type", &self.return_type.to_string())
            .field("arguments", &self.arguments.len())
            .finish()
    }
}
