//! Axum handlers for GraphQL endpoints.
//!
//! - `POST {path}` - queries and mutations
//! - `GET {ws_path}` - subscriptions over WebSocket (`graphql-transport-ws`
//!   and the legacy `graphql-ws` protocol)
//!
//! Subscription streams end when the client stops the operation or the socket
//! closes; async-graphql drops the stream and the session closes with it.

use async_graphql::dynamic::Schema;
use async_graphql::http::ALL_WEBSOCKET_PROTOCOLS;
use async_graphql::{Data, Request, Variables};
use async_graphql_axum::{GraphQLProtocol, GraphQLWebSocket};
use axum::Json;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use topicstream_core::RequestContext;
use tracing::debug;

/// State shared across GraphQL handlers.
#[derive(Clone)]
pub struct GraphQLState {
    /// The executable schema.
    pub schema: Schema,
}

impl GraphQLState {
    /// Creates handler state for `schema`.
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }
}

/// GraphQL request body.
#[derive(Debug, Deserialize)]
pub struct GraphQLRequest {
    /// The GraphQL query string.
    pub query: String,

    /// Optional operation name for multi-operation documents.
    #[serde(rename = "operationName")]
    pub operation_name: Option<String>,

    /// Optional variables for the query.
    pub variables: Option<serde_json::Value>,
}

/// Handles POST requests carrying queries and mutations.
pub async fn graphql_handler(
    State(state): State<GraphQLState>,
    headers: HeaderMap,
    Json(request): Json<GraphQLRequest>,
) -> impl IntoResponse {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut context = RequestContext::anonymous();
    context.request_id = request_id;

    let mut gql_request = Request::new(&request.query);
    if let Some(op_name) = request.operation_name {
        gql_request = gql_request.operation_name(op_name);
    }
    if let Some(vars) = request.variables {
        gql_request = gql_request.variables(Variables::from_json(vars));
    }
    gql_request = gql_request.data(context);

    debug!(query = %request.query, "Executing GraphQL request");
    let response = state.schema.execute(gql_request).await;

    // GraphQL always answers 200 OK, errors travel in the body.
    (StatusCode::OK, Json(response))
}

/// Upgrades a GET request to a GraphQL WebSocket.
pub async fn graphql_ws_handler(
    State(state): State<GraphQLState>,
    protocol: GraphQLProtocol,
    upgrade: WebSocketUpgrade,
) -> Response {
    let schema = state.schema.clone();
    upgrade
        .protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |socket| {
            GraphQLWebSocket::new(socket, schema, protocol)
                .on_connection_init(connection_init)
                .serve()
        })
        .into_response()
}

/// Builds the connection-level context from the `connection_init` payload.
///
/// An optional `userId` string in the payload marks the connection as
/// authenticated; any other payload keys are kept as context extras.
pub async fn connection_init(payload: serde_json::Value) -> async_graphql::Result<Data> {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let user_id = payload
        .get("userId")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    let mut builder = RequestContext::builder()
        .with_request_id(connection_id.clone())
        .with_connection_id(connection_id.clone())
        .with_user(user_id.clone());
    if let serde_json::Value::Object(extra) = payload {
        for (key, value) in extra.into_iter().filter(|(k, _)| k != "userId") {
            builder = builder.with_extra(key, value);
        }
    }
    let context = builder.build()?;

    debug!(connection_id = %connection_id, user_id = ?user_id, "GraphQL WebSocket connection initialized");

    let mut data = Data::default();
    data.insert(context);
    Ok(data)
}
