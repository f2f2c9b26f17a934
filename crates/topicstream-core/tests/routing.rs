//! End-to-end routing tests over both bus backends.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};
use tokio::sync::Notify;
use topicstream_core::{
    BusConfig, CloseReason, ConfigurationError, EventBusKind, RequestArgs, RequestContext, SessionState,
    SubscriptionEngine, SubscriptionError, SubscriptionFieldSpec, SubscriptionStream,
    SubscriptionsConfig, Topic,
};

fn engine(backend: EventBusKind) -> SubscriptionEngine {
    SubscriptionEngine::from_config(&SubscriptionsConfig {
        bus: BusConfig {
            backend,
            ..BusConfig::default()
        },
        ..SubscriptionsConfig::default()
    })
}

fn engine_with_capacity(backend: EventBusKind, broadcast_capacity: usize) -> SubscriptionEngine {
    SubscriptionEngine::from_config(&SubscriptionsConfig {
        bus: BusConfig {
            backend,
            broadcast_capacity,
        },
        ..SubscriptionsConfig::default()
    })
}

fn backends() -> [EventBusKind; 2] {
    [EventBusKind::InMemory, EventBusKind::Broadcast]
}

fn args(pairs: &[(&str, Value)]) -> RequestArgs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn open(
    engine: &SubscriptionEngine,
    spec: &SubscriptionFieldSpec,
    args: RequestArgs,
) -> SubscriptionStream {
    engine
        .create_session(spec, args, RequestContext::anonymous())
        .expect("session should open")
}

async fn next(stream: &mut SubscriptionStream) -> Option<Value> {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .ok()
        .flatten()
}

async fn assert_silent(stream: &mut SubscriptionStream) {
    let result = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
    assert!(result.is_err(), "unexpected delivery: {result:?}");
}

fn dynamic_spec() -> SubscriptionFieldSpec {
    SubscriptionFieldSpec::builder("subscriptionToDynamicTopic", "SampleResolver")
        .dynamic_topics(|args: &RequestArgs, _: &RequestContext| {
            args.get("topic").and_then(Value::as_str).map(str::to_string)
        })
        .build()
}

#[tokio::test]
async fn static_spec_registers_one_listener_per_distinct_topic() {
    for backend in backends() {
        let engine = engine(backend);
        let spec = SubscriptionFieldSpec::builder("multi", "SampleResolver")
            .topics(["A", "B", "A", "C"])
            .build();

        let stream = open(&engine, &spec, RequestArgs::new());
        assert_eq!(stream.handle().topics().len(), 3);
        for topic in ["A", "B", "C"] {
            assert_eq!(engine.bus().listener_count(&Topic::from(topic)), 1);
        }
        assert_eq!(engine.bus().topic_count(), 3);
    }
}

#[test]
fn empty_static_spec_is_a_configuration_error() {
    let spec = SubscriptionFieldSpec::builder("normalSubscription", "SampleResolver").build();
    let err = assert_err!(spec.validate());
    assert_eq!(
        err,
        ConfigurationError::EmptyTopics {
            field: "normalSubscription".into(),
            owner: "SampleResolver".into(),
        }
    );
}

#[tokio::test]
async fn empty_dynamic_topics_fail_only_that_operation() {
    for backend in backends() {
        let engine = engine(backend);
        let spec = dynamic_spec();

        let err = assert_err!(engine.create_session(
            &spec,
            RequestArgs::new(),
            RequestContext::anonymous()
        ));
        assert!(matches!(err, SubscriptionError::MissingTopics { .. }));
        assert_eq!(engine.bus().topic_count(), 0);

        // The engine keeps serving.
        let mut stream = open(&engine, &spec, args(&[("topic", json!("X"))]));
        assert_ok!(engine.publisher().publish("X", "still alive"));
        assert_eq!(next(&mut stream).await, Some(json!("still alive")));
    }
}

#[tokio::test]
async fn events_reach_only_sessions_on_their_topic() {
    for backend in backends() {
        let engine = engine(backend);
        let on_a = SubscriptionFieldSpec::builder("a", "R").topic("A").build();
        let on_b = SubscriptionFieldSpec::builder("b", "R").topic("B").build();

        let mut a1 = open(&engine, &on_a, RequestArgs::new());
        let mut a2 = open(&engine, &on_a, RequestArgs::new());
        let mut b = open(&engine, &on_b, RequestArgs::new());

        assert_ok!(engine.publisher().publish("A", json!({"n": 1})));

        assert_eq!(next(&mut a1).await, Some(json!({"n": 1})));
        assert_eq!(next(&mut a2).await, Some(json!({"n": 1})));
        assert_silent(&mut b).await;
    }
}

#[tokio::test]
async fn filter_drops_events_and_keeps_order() {
    for backend in backends() {
        let engine = engine(backend);
        let spec = SubscriptionFieldSpec::builder("subscriptionWithFilter", "SampleResolver")
            .topic("VALUES")
            .filter(|input| input.payload.as_f64().is_some_and(|v| v > 0.5))
            .build();
        let mut stream = open(&engine, &spec, RequestArgs::new());

        let publisher = engine.bound_publisher("VALUES");
        for value in [0.23, 0.77, 0.44] {
            assert_ok!(publisher.publish(value));
        }

        assert_eq!(next(&mut stream).await, Some(json!(0.77)));
        assert_silent(&mut stream).await;
    }
}

#[tokio::test]
async fn sequential_publishes_are_observed_in_order() {
    for backend in backends() {
        let engine = engine(backend);
        let spec = SubscriptionFieldSpec::builder("normalSubscription", "SampleResolver")
            .topic("NOTIFICATIONS")
            .build();
        let mut stream = open(&engine, &spec, RequestArgs::new());

        for value in [1.23, 2.37, 4.53] {
            assert_ok!(engine.publisher().publish("NOTIFICATIONS", value));
        }

        for expected in [1.23, 2.37, 4.53] {
            assert_eq!(next(&mut stream).await, Some(json!(expected)));
        }
    }
}

#[tokio::test]
async fn unsubscribe_removes_all_registrations() {
    for backend in backends() {
        let engine = engine(backend);
        let spec = SubscriptionFieldSpec::builder("multi", "R")
            .topics(["A", "B"])
            .build();
        let mut stream = open(&engine, &spec, RequestArgs::new());
        let handle = stream.handle();

        handle.close();
        assert_eq!(engine.bus().topic_count(), 0);

        assert_ok!(engine.publisher().publish("A", 1));
        assert_ok!(engine.publisher().publish("B", 2));
        assert_eq!(next(&mut stream).await, None);
        assert_eq!(handle.state(), SessionState::Closed);
        assert_eq!(engine.stats().active_sessions, 0);
    }
}

#[tokio::test]
async fn dynamic_topics_route_by_computed_value() {
    for backend in backends() {
        let engine = engine(backend);
        let spec = dynamic_spec();

        let mut first = open(&engine, &spec, args(&[("topic", json!("room-1"))]));
        let mut second = open(&engine, &spec, args(&[("topic", json!("room-1"))]));
        let mut other = open(&engine, &spec, args(&[("topic", json!("room-2"))]));
        assert_eq!(engine.bus().listener_count(&Topic::from("room-1")), 2);

        assert_ok!(engine.publisher().publish("room-1", "hello"));

        assert_eq!(next(&mut first).await, Some(json!("hello")));
        assert_eq!(next(&mut second).await, Some(json!("hello")));
        assert_silent(&mut other).await;
    }
}

#[tokio::test]
async fn bound_publisher_matches_generic_publisher() {
    for backend in backends() {
        let engine = engine(backend);
        let spec = SubscriptionFieldSpec::builder("normalSubscription", "SampleResolver")
            .topic("NOTIFICATIONS")
            .build();
        let mut stream = open(&engine, &spec, RequestArgs::new());

        let payload = json!({"id": 7, "message": "same"});
        assert_ok!(engine.publisher().publish("NOTIFICATIONS", &payload));
        assert_ok!(engine.bound_publisher("NOTIFICATIONS").publish(&payload));

        let from_generic = next(&mut stream).await;
        let from_bound = next(&mut stream).await;
        assert_eq!(from_generic, Some(payload.clone()));
        assert_eq!(from_generic, from_bound);
    }
}

#[tokio::test]
async fn filter_and_projection_see_request_args() {
    for backend in backends() {
        let engine = engine(backend);
        let spec = SubscriptionFieldSpec::builder("above", "R")
            .topic("VALUES")
            .filter(|input| {
                let min = input.args.get("min").and_then(Value::as_i64).unwrap_or(0);
                input.payload.as_i64().is_some_and(|v| v >= min)
            })
            .project(|input| {
                let label = input.args.get("label").cloned().unwrap_or(Value::Null);
                Ok(json!({ "label": label, "value": input.payload.as_ref().clone() }))
            })
            .build();
        let mut stream = open(
            &engine,
            &spec,
            args(&[("min", json!(10)), ("label", json!("big"))]),
        );

        for value in [5, 10, 3, 20] {
            assert_ok!(engine.publisher().publish("VALUES", value));
        }
        assert_eq!(
            next(&mut stream).await,
            Some(json!({"label": "big", "value": 10}))
        );
        assert_eq!(
            next(&mut stream).await,
            Some(json!({"label": "big", "value": 20}))
        );
    }
}

#[tokio::test]
async fn failing_session_does_not_affect_others() {
    for backend in backends() {
        let engine = engine(backend);
        let broken = SubscriptionFieldSpec::builder("broken", "R")
            .topic("A")
            .filter(|_| panic!("filter bug"))
            .build();
        let healthy = SubscriptionFieldSpec::builder("healthy", "R")
            .topic("A")
            .build();

        let mut broken_stream = open(&engine, &broken, RequestArgs::new());
        let mut healthy_stream = open(&engine, &healthy, RequestArgs::new());

        assert_ok!(engine.publisher().publish("A", 1));
        assert_eq!(next(&mut healthy_stream).await, Some(json!(1)));
        assert_silent(&mut broken_stream).await;
        assert_eq!(broken_stream.handle().state(), SessionState::Active);
    }
}

#[tokio::test]
async fn shutdown_ends_every_stream() {
    for backend in backends() {
        let engine = engine(backend);
        let spec = SubscriptionFieldSpec::builder("f", "R").topic("A").build();
        let mut first = open(&engine, &spec, RequestArgs::new());
        let mut second = open(&engine, &spec, RequestArgs::new());

        engine.shutdown();
        assert_eq!(next(&mut first).await, None);
        assert_eq!(next(&mut second).await, None);
        assert!(engine.publisher().publish("A", 1).is_err());

        let err = assert_err!(engine.create_session(
            &spec,
            RequestArgs::new(),
            RequestContext::anonymous()
        ));
        assert_eq!(err.error_code(), "REGISTRATION_FAILED");
    }
}

#[tokio::test]
async fn concurrent_publishers_preserve_per_publisher_order() {
    let engine = engine(EventBusKind::InMemory);
    let spec = SubscriptionFieldSpec::builder("f", "R").topic("A").build();
    let mut stream = open(&engine, &spec, RequestArgs::new());

    let mut tasks = Vec::new();
    for publisher_id in 0..4 {
        let publisher = engine.publisher();
        tasks.push(tokio::spawn(async move {
            for seq in 0..50 {
                publisher
                    .publish("A", json!({"p": publisher_id, "seq": seq}))
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut last_seen = [-1i64; 4];
    for _ in 0..200 {
        let value = next(&mut stream).await.expect("event");
        let p = value["p"].as_u64().unwrap() as usize;
        let seq = value["seq"].as_i64().unwrap();
        assert!(seq > last_seen[p]);
        last_seen[p] = seq;
    }
    assert_eq!(last_seen, [49; 4]);
}

#[tokio::test]
async fn burst_beyond_capacity_is_not_silently_lost() {
    for backend in backends() {
        let engine = engine_with_capacity(backend, 16);
        let spec = SubscriptionFieldSpec::builder("f", "R").topic("A").build();
        let mut stream = open(&engine, &spec, RequestArgs::new());
        let handle = stream.handle();

        for value in 0..40 {
            assert_ok!(engine.publisher().publish("A", value));
        }

        let mut received = Vec::new();
        while let Some(value) = next(&mut stream).await {
            received.push(value);
            if received.len() == 40 {
                break;
            }
        }

        // Whatever arrives is a gap-free prefix of what was published.
        let expected: Vec<Value> = (0..received.len()).map(|v| json!(v)).collect();
        assert_eq!(received, expected, "{backend:?}");

        match backend {
            EventBusKind::InMemory => {
                assert_eq!(received.len(), 40);
                assert_eq!(handle.state(), SessionState::Active);
            }
            EventBusKind::Broadcast => {
                assert!(received.len() < 40);
                assert_eq!(handle.close_reason(), Some(CloseReason::Lagged));
                assert_eq!(handle.state(), SessionState::Closed);
                assert_eq!(engine.bus().topic_count(), 0);
                assert_eq!(engine.stats().active_sessions, 0);
            }
        }
    }
}

#[tokio::test]
async fn panicking_topic_fn_fails_only_that_operation() {
    for backend in backends() {
        let engine = engine(backend);
        let broken = SubscriptionFieldSpec::builder("broken", "R")
            .dynamic_topics(|_: &RequestArgs, _: &RequestContext| -> String {
                panic!("topic bug")
            })
            .build();

        let err = assert_err!(engine.create_session(
            &broken,
            RequestArgs::new(),
            RequestContext::anonymous()
        ));
        assert!(matches!(
            err,
            SubscriptionError::TopicResolution { ref field, ref message }
                if field == "broken" && message == "topic bug"
        ));
        assert_eq!(err.error_code(), "TOPIC_RESOLUTION_FAILED");
        assert_eq!(engine.bus().topic_count(), 0);
        assert_eq!(engine.stats().sessions_rejected, 1);

        let mut stream = open(&engine, &dynamic_spec(), args(&[("topic", json!("X"))]));
        assert_ok!(engine.publisher().publish("X", "still alive"));
        assert_eq!(next(&mut stream).await, Some(json!("still alive")));
    }
}

#[tokio::test]
async fn close_during_inflight_projection_emits_it_then_ends() {
    for backend in backends() {
        let engine = engine(backend);
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let spec = {
            let started = started.clone();
            let gate = gate.clone();
            SubscriptionFieldSpec::builder("slow", "R")
                .topic("A")
                .resolve(move |input| {
                    let started = started.clone();
                    let gate = gate.clone();
                    async move {
                        started.notify_one();
                        gate.notified().await;
                        Ok(input.payload.as_ref().clone())
                    }
                })
                .build()
        };
        let mut stream = open(&engine, &spec, RequestArgs::new());
        let handle = stream.handle();

        assert_ok!(engine.publisher().publish("A", 1));
        assert_ok!(engine.publisher().publish("A", 2));

        let consumer = tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(value) = stream.next().await {
                received.push(value);
            }
            received
        });

        started.notified().await;
        handle.close();
        assert_eq!(handle.state(), SessionState::Draining);
        gate.notify_one();

        let received = assert_ok!(tokio::time::timeout(Duration::from_secs(2), consumer).await);
        assert_eq!(assert_ok!(received), vec![json!(1)]);
        assert_eq!(handle.state(), SessionState::Closed);
        assert_eq!(handle.close_reason(), Some(CloseReason::ClientCancelled));
        assert_eq!(engine.bus().topic_count(), 0);
    }
}
