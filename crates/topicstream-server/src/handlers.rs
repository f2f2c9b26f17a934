use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use topicstream_core::{EngineStats, SubscriptionEngine};

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    pub status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Session and publish counters of the engine.
pub async fn stats(State(engine): State<SubscriptionEngine>) -> Json<EngineStats> {
    Json(engine.stats())
}
