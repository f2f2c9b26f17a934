//! Notification sample schema.
//!
//! Exercises every publishing and routing style the engine offers:
//!
//! | Mutation                        | Publisher        | Topic            |
//! |---------------------------------|------------------|------------------|
//! | `pubSubMutation`                | generic          | `NOTIFICATIONS`  |
//! | `publisherMutation`             | bound            | `NOTIFICATIONS`  |
//! | `pubSubMutationToDynamicTopic`  | generic          | `topic` argument |
//!
//! `subscriptionWithFilter*` only deliver notifications with an even id.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_graphql::Value;
use async_graphql::dynamic::{Field, FieldFuture, InputValue, ResolverContext, Schema, TypeRef};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use topicstream_core::{
    FilterInput, ProjectionError, RequestArgs, RequestContext, ResolveInput, SubscriptionEngine,
    SubscriptionFieldSpec,
};
use topicstream_graphql::{
    GraphQLConfig, GraphQLError, PublisherContextExt, SubscriptionFieldDef,
    SubscriptionSchemaBuilder, json_object_type, json_to_graphql_value,
};

/// Topic the static sample fields publish to and listen on.
pub const NOTIFICATIONS_TOPIC: &str = "NOTIFICATIONS";

const NOTIFICATION: &str = "Notification";
const OWNER: &str = "NotificationResolver";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub message: Option<String>,
    pub date: String,
}

impl Notification {
    pub fn new(id: i64, message: Option<String>) -> Self {
        Self {
            id,
            message,
            date: now_rfc3339(),
        }
    }

    fn to_graphql(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self).map(json_to_graphql_value)
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339).unwrap_or_else(|_| now.to_string())
}

#[derive(Debug, Clone, Copy)]
enum PublishTarget {
    Generic,
    Bound,
    Dynamic,
}

/// Builds the sample schema on top of `engine`.
pub fn build_sample_schema(
    engine: &SubscriptionEngine,
    config: &GraphQLConfig,
) -> Result<Schema, GraphQLError> {
    let ids = Arc::new(AtomicI64::new(0));

    SubscriptionSchemaBuilder::new(engine.clone(), config.clone())
        .register(json_object_type(
            NOTIFICATION,
            [
                ("id", TypeRef::named_nn(TypeRef::INT)),
                ("message", TypeRef::named(TypeRef::STRING)),
                ("date", TypeRef::named_nn(TypeRef::STRING)),
            ],
        ))
        .query_field(current_date_field())
        .mutation_field(publish_field(
            "pubSubMutation",
            "Publish a notification through the generic publisher",
            ids.clone(),
            PublishTarget::Generic,
        ))
        .mutation_field(publish_field(
            "publisherMutation",
            "Publish a notification through a publisher bound to NOTIFICATIONS",
            ids.clone(),
            PublishTarget::Bound,
        ))
        .mutation_field(publish_field(
            "pubSubMutationToDynamicTopic",
            "Publish a notification to the given topic",
            ids,
            PublishTarget::Dynamic,
        ))
        .subscription(SubscriptionFieldDef::new(
            SubscriptionFieldSpec::builder("normalSubscription", OWNER)
                .description("Every notification published to NOTIFICATIONS")
                .topic(NOTIFICATIONS_TOPIC)
                .project(project_notification)
                .build(),
            TypeRef::named_nn(NOTIFICATION),
        ))
        .subscription(SubscriptionFieldDef::new(
            SubscriptionFieldSpec::builder("subscriptionWithFilter", OWNER)
                .description("Notifications on NOTIFICATIONS with an even id")
                .topic(NOTIFICATIONS_TOPIC)
                .filter(has_even_id)
                .project(project_notification)
                .build(),
            TypeRef::named_nn(NOTIFICATION),
        ))
        .subscription(
            SubscriptionFieldDef::new(
                SubscriptionFieldSpec::builder("subscriptionWithFilterToDynamicTopic", OWNER)
                    .description("Notifications with an even id on the given topic")
                    .dynamic_topics(topic_argument)
                    .filter(has_even_id)
                    .project(project_notification)
                    .build(),
                TypeRef::named_nn(NOTIFICATION),
            )
            .argument(InputValue::new("topic", TypeRef::named_nn(TypeRef::STRING))),
        )
        .build()
}

fn has_even_id(input: &FilterInput<'_>) -> bool {
    input
        .payload
        .get("id")
        .and_then(serde_json::Value::as_i64)
        .is_some_and(|id| id % 2 == 0)
}

fn topic_argument(args: &RequestArgs, _: &RequestContext) -> Option<String> {
    args.get("topic")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

fn project_notification(input: ResolveInput) -> Result<serde_json::Value, ProjectionError> {
    let notification: Notification = serde_json::from_value((*input.payload).clone())?;
    Ok(serde_json::to_value(notification)?)
}

fn publish_field(
    name: &str,
    description: &str,
    ids: Arc<AtomicI64>,
    target: PublishTarget,
) -> Field {
    let field = Field::new(name, TypeRef::named_nn(NOTIFICATION), move |ctx| {
        let ids = ids.clone();
        FieldFuture::new(async move {
            let message = ctx
                .args
                .get("message")
                .and_then(|v| v.string().ok())
                .map(str::to_string);
            let notification = Notification::new(ids.fetch_add(1, Ordering::Relaxed) + 1, message);

            publish(&ctx, target, &notification)?;
            tracing::debug!(id = notification.id, ?target, "Notification published");

            Ok(Some(notification.to_graphql()?))
        })
    })
    .description(description)
    .argument(InputValue::new("message", TypeRef::named(TypeRef::STRING)));

    match target {
        PublishTarget::Dynamic => {
            field.argument(InputValue::new("topic", TypeRef::named_nn(TypeRef::STRING)))
        }
        PublishTarget::Generic | PublishTarget::Bound => field,
    }
}

fn publish(
    ctx: &ResolverContext<'_>,
    target: PublishTarget,
    notification: &Notification,
) -> async_graphql::Result<()> {
    let published = match target {
        PublishTarget::Generic => ctx.publisher()?.publish(NOTIFICATIONS_TOPIC, notification),
        PublishTarget::Bound => ctx
            .bound_publisher(NOTIFICATIONS_TOPIC)?
            .publish(notification),
        PublishTarget::Dynamic => {
            let topic = ctx.args.try_get("topic")?.string()?;
            ctx.publisher()?.publish(topic, notification)
        }
    };
    published.map_err(|e| GraphQLError::from(e).into_graphql_error())
}

fn current_date_field() -> Field {
    Field::new("currentDate", TypeRef::named_nn(TypeRef::STRING), |_| {
        FieldFuture::new(async move { Ok(Some(Value::from(now_rfc3339()))) })
    })
    .description("Current server time (RFC 3339)")
}
