use std::net::SocketAddr;

use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};
use topicstream_core::SubscriptionEngine;
use topicstream_graphql::{GraphQLError, GraphQLState, graphql_handler, graphql_ws_handler};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, handlers, sample};

/// State shared by every route.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub graphql: GraphQLState,
    pub engine: SubscriptionEngine,
}

pub struct TopicstreamServer {
    addr: SocketAddr,
    app: Router,
    engine: SubscriptionEngine,
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    let graphql = &cfg.graphql;
    let graphql_routes = if graphql.path == graphql.ws_path {
        Router::new().route(
            &graphql.path,
            post(graphql_handler).get(graphql_ws_handler),
        )
    } else {
        Router::new()
            .route(&graphql.path, post(graphql_handler))
            .route(&graphql.ws_path, get(graphql_ws_handler))
    };

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/stats", get(handlers::stats))
        .merge(graphql_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let request_id = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %request_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            status = res.status().as_u16(),
                            latency_ms = latency.as_millis() as u64,
                            "request completed"
                        );
                    },
                ),
        )
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Creates the engine and the sample schema and assembles the router.
    ///
    /// Fails when a subscription declaration is invalid, before anything
    /// is bound.
    pub fn build(self) -> Result<TopicstreamServer, GraphQLError> {
        let engine = SubscriptionEngine::from_config(&self.config.subscriptions);
        let schema = sample::build_sample_schema(&engine, &self.config.graphql)?;
        let state = AppState {
            graphql: GraphQLState::new(schema),
            engine: engine.clone(),
        };
        let app = build_app(&self.config, state);

        Ok(TopicstreamServer {
            addr: self.addr,
            app,
            engine,
        })
    }
}

impl TopicstreamServer {
    pub fn engine(&self) -> &SubscriptionEngine {
        &self.engine
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let engine = self.engine.clone();
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal(engine))
            .await?;
        Ok(())
    }
}

/// Waits for Ctrl+C, then shuts the bus down so open subscription streams
/// end and WebSocket connections can drain.
async fn shutdown_signal(engine: SubscriptionEngine) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    engine.shutdown();
}
