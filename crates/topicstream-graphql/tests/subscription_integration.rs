//! Subscriptions executed through a real async-graphql schema.

use std::time::Duration;

use async_graphql::Value;
use async_graphql::dynamic::{Field, FieldFuture, InputValue, Schema, TypeRef};
use futures_util::{Stream, StreamExt};
use serde_json::json;
use topicstream_core::{
    RequestArgs, RequestContext, SubscriptionEngine, SubscriptionFieldSpec, SubscriptionsConfig,
};
use topicstream_graphql::{
    GraphQLConfig, PublisherContextExt, SubscriptionFieldDef, SubscriptionSchemaBuilder,
    json_object_type,
};

fn publish_field() -> Field {
    Field::new("publish", TypeRef::named_nn(TypeRef::BOOLEAN), |ctx| {
        FieldFuture::new(async move {
            let topic = ctx.args.try_get("topic")?.string()?.to_string();
            let value = ctx.args.try_get("value")?.f64()?;
            ctx.publisher()?.publish(topic, value)?;
            Ok(Some(Value::Boolean(true)))
        })
    })
    .argument(InputValue::new("topic", TypeRef::named_nn(TypeRef::STRING)))
    .argument(InputValue::new("value", TypeRef::named_nn(TypeRef::FLOAT)))
}

fn build_schema(engine: &SubscriptionEngine) -> Schema {
    let values = SubscriptionFieldSpec::builder("values", "TestResolver")
        .topic("VALUES")
        .build();
    let large_values = SubscriptionFieldSpec::builder("largeValues", "TestResolver")
        .topic("VALUES")
        .filter(|input| input.payload.as_f64().is_some_and(|v| v > 0.5))
        .build();
    let room = SubscriptionFieldSpec::builder("room", "TestResolver")
        .dynamic_topics(|args: &RequestArgs, _: &RequestContext| {
            args.get("topic")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .build();
    let notifications = SubscriptionFieldSpec::builder("notifications", "TestResolver")
        .topic("VALUES")
        .project(|input| {
            Ok(json!({
                "id": 1,
                "message": format!("value {}", input.payload),
            }))
        })
        .build();

    SubscriptionSchemaBuilder::new(engine.clone(), GraphQLConfig::default())
        .register(json_object_type(
            "Notification",
            [
                ("id", TypeRef::named_nn(TypeRef::INT)),
                ("message", TypeRef::named(TypeRef::STRING)),
            ],
        ))
        .subscription(SubscriptionFieldDef::new(values, TypeRef::named_nn(TypeRef::FLOAT)))
        .subscription(SubscriptionFieldDef::new(
            large_values,
            TypeRef::named_nn(TypeRef::FLOAT),
        ))
        .subscription(
            SubscriptionFieldDef::new(room, TypeRef::named_nn(TypeRef::FLOAT))
                .argument(InputValue::new("topic", TypeRef::named(TypeRef::STRING))),
        )
        .subscription(SubscriptionFieldDef::new(
            notifications,
            TypeRef::named_nn("Notification"),
        ))
        .mutation_field(publish_field())
        .build()
        .expect("schema should build")
}

fn setup() -> (SubscriptionEngine, Schema) {
    let engine = SubscriptionEngine::from_config(&SubscriptionsConfig::default());
    let schema = build_schema(&engine);
    (engine, schema)
}

/// Polls the response stream until the engine reports `expected` open sessions.
async fn wait_for_sessions<S>(engine: &SubscriptionEngine, stream: &mut S, expected: usize)
where
    S: Stream<Item = async_graphql::Response> + Unpin,
{
    for _ in 0..50 {
        if engine.stats().active_sessions >= expected {
            return;
        }
        let _ = tokio::time::timeout(Duration::from_millis(10), stream.next()).await;
    }
    panic!("subscription never started");
}

async fn next_data<S>(stream: &mut S) -> serde_json::Value
where
    S: Stream<Item = async_graphql::Response> + Unpin,
{
    let response = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for event")
        .expect("stream ended");
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    response.data.into_json().unwrap()
}

async fn publish(schema: &Schema, topic: &str, value: f64) {
    let response = schema
        .execute(format!(
            "mutation {{ publish(topic: \"{topic}\", value: {value}) }}"
        ))
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
}

#[tokio::test]
async fn mutation_publish_reaches_subscription_in_order() {
    let (engine, schema) = setup();
    let mut stream = schema.execute_stream("subscription { values }");
    wait_for_sessions(&engine, &mut stream, 1).await;

    for value in [1.23, 2.37, 4.53] {
        publish(&schema, "VALUES", value).await;
    }

    for expected in [1.23, 2.37, 4.53] {
        assert_eq!(next_data(&mut stream).await, json!({ "values": expected }));
    }
}

#[tokio::test]
async fn filtered_subscription_skips_rejected_events() {
    let (engine, schema) = setup();
    let mut stream = schema.execute_stream("subscription { largeValues }");
    wait_for_sessions(&engine, &mut stream, 1).await;

    for value in [0.23, 0.77, 0.44] {
        publish(&schema, "VALUES", value).await;
    }
    publish(&schema, "VALUES", 0.9).await;

    assert_eq!(next_data(&mut stream).await, json!({ "largeValues": 0.77 }));
    assert_eq!(next_data(&mut stream).await, json!({ "largeValues": 0.9 }));
}

#[tokio::test]
async fn projected_object_fields_are_resolved() {
    let (engine, schema) = setup();
    let mut stream = schema.execute_stream("subscription { notifications { id message } }");
    wait_for_sessions(&engine, &mut stream, 1).await;

    publish(&schema, "VALUES", 2.5).await;

    assert_eq!(
        next_data(&mut stream).await,
        json!({ "notifications": { "id": 1, "message": "value 2.5" } })
    );
}

#[tokio::test]
async fn dynamic_topic_routes_by_argument() {
    let (engine, schema) = setup();
    let mut first = schema.execute_stream("subscription { room(topic: \"r1\") }");
    wait_for_sessions(&engine, &mut first, 1).await;
    let mut other = schema.execute_stream("subscription { room(topic: \"r2\") }");
    wait_for_sessions(&engine, &mut other, 2).await;

    publish(&schema, "r1", 1.0).await;

    assert_eq!(next_data(&mut first).await, json!({ "room": 1.0 }));
    let silent = tokio::time::timeout(Duration::from_millis(100), other.next()).await;
    assert!(silent.is_err());
}

#[tokio::test]
async fn missing_dynamic_topic_fails_only_that_operation() {
    let (engine, schema) = setup();
    let mut failing = schema.execute_stream("subscription { room }");

    let response = tokio::time::timeout(Duration::from_secs(2), failing.next())
        .await
        .expect("timed out")
        .expect("error response");
    assert_eq!(response.errors.len(), 1);
    let code = response.errors[0]
        .extensions
        .as_ref()
        .and_then(|ext| ext.get("code"))
        .cloned();
    assert_eq!(code, Some(Value::from("MISSING_TOPICS")));
    assert_eq!(engine.stats().active_sessions, 0);

    // Other subscriptions keep working.
    let mut stream = schema.execute_stream("subscription { values }");
    wait_for_sessions(&engine, &mut stream, 1).await;
    publish(&schema, "VALUES", 3.0).await;
    assert_eq!(next_data(&mut stream).await, json!({ "values": 3.0 }));
}

#[tokio::test]
async fn dropping_the_stream_closes_the_session() {
    let (engine, schema) = setup();
    let mut stream = schema.execute_stream("subscription { values }");
    wait_for_sessions(&engine, &mut stream, 1).await;
    assert_eq!(engine.bus().topic_count(), 1);

    drop(stream);
    assert_eq!(engine.stats().active_sessions, 0);
    assert_eq!(engine.bus().topic_count(), 0);

    publish(&schema, "VALUES", 1.0).await;
}

#[tokio::test]
async fn active_subscriptions_query() {
    let (engine, schema) = setup();
    let mut stream = schema.execute_stream("subscription { values }");
    wait_for_sessions(&engine, &mut stream, 1).await;

    let response = schema.execute("{ activeSubscriptions }").await;
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({ "activeSubscriptions": 1 })
    );
}
