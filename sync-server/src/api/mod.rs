//! HTTP API
//!
//! 路由按资源分文件，每个文件导出 `router()`，在这里合并并叠加
//! 中间件（CORS、压缩、trace、request-id）。

use axum::Router;
use http::{HeaderName, HeaderValue};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::ServerState;

pub mod health;
pub mod mappings;
pub mod schedules;
pub mod schema;
pub mod sync;
pub mod webhooks;

/// Custom request ID generator
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Build a router with all routes registered (no middleware)
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(sync::router())
        .merge(mappings::router())
        .merge(schedules::router())
        .merge(webhooks::router())
        .merge(schema::router())
}

/// Build a fully configured application with middleware and state
pub fn build_app(state: ServerState) -> Router {
    build_router()
        // CORS - Handle cross-origin requests
        .layer(CorsLayer::permissive())
        // Compression - Gzip compress responses
        .layer(CompressionLayer::new())
        // Trace - Request tracing (logs at INFO level)
        .layer(TraceLayer::new_for_http())
        // Request ID - Generate unique ID for each request
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            XRequestId,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .with_state(state)
}
