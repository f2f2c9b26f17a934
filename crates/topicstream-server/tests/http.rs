//! Router-level checks through `tower::ServiceExt::oneshot`.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use topicstream_server::ServerBuilder;
use topicstream_server::config::AppConfig;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_returns_ok() {
    let server = ServerBuilder::new().build().unwrap();
    let response = server
        .router()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn graphql_mutation_over_http_updates_stats() {
    let server = ServerBuilder::new().build().unwrap();
    let request = Request::post("/graphql")
        .header("content-type", "application/json")
        .header("x-request-id", "req-1")
        .body(Body::from(
            json!({ "query": "mutation { pubSubMutation(message: \"hi\") { id message } }" })
                .to_string(),
        ))
        .unwrap();

    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "data": { "pubSubMutation": { "id": 1, "message": "hi" } } })
    );

    let stats = server
        .router()
        .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let stats = body_json(stats).await;
    assert_eq!(stats["events_published"], json!(1));
    assert_eq!(stats["active_sessions"], json!(0));
}

#[tokio::test]
async fn shared_graphql_and_ws_path() {
    let mut config = AppConfig::default();
    config.graphql.ws_path = config.graphql.path.clone();
    let server = ServerBuilder::new().with_config(config).build().unwrap();

    let request = Request::post("/graphql")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "query": "{ activeSubscriptions }" }).to_string()))
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(
        body_json(response).await,
        json!({ "data": { "activeSubscriptions": 0 } })
    );
}
