//! 健康检查路由
//!
//! 每个探测都与 5 秒超时赛跑，超时按断连处理而不是挂起请求。

use std::time::{Duration, Instant};

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;

/// How long one dependency probe may take before it counts as down
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 健康检查路由 - 公共路由
pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/health/detailed", get(detailed_health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    checks: HealthChecks,
    running_syncs: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    database: CheckResult,
    platform: CheckResult,
    shared_store: CheckResult,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl CheckResult {
    fn ok_with_latency(latency_ms: u64) -> Self {
        Self {
            status: "ok",
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    fn not_configured() -> Self {
        Self {
            status: "not_configured",
            latency_ms: None,
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    fn is_down(&self) -> bool {
        self.status == "error"
    }
}

/// 基础健康检查
pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
    })
}

/// 包含组件状态的详细健康检查
pub async fn detailed_health(State(state): State<ServerState>) -> Json<DetailedHealthResponse> {
    let database = match &state.db {
        Some(db) => probe(db.test_connection()).await,
        None => CheckResult::not_configured(),
    };

    let platform = match &state.platform {
        Some(platform) => probe(platform.test_connection()).await,
        None => CheckResult::not_configured(),
    };

    let shared_store = match &state.store {
        Some(store) => probe(store.ping()).await,
        None => CheckResult::not_configured(),
    };

    let degraded = database.is_down() || platform.is_down() || shared_store.is_down();

    Json(DetailedHealthResponse {
        status: if degraded { "degraded" } else { "healthy" },
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            database,
            platform,
            shared_store,
        },
        running_syncs: state.registry.list().len(),
    })
}

/// Race one dependency check against the probe timeout
async fn probe<F>(check: F) -> CheckResult
where
    F: std::future::Future<Output = Result<(), crate::utils::AppError>>,
{
    let started = Instant::now();
    match tokio::time::timeout(PROBE_TIMEOUT, check).await {
        Ok(Ok(())) => CheckResult::ok_with_latency(started.elapsed().as_millis() as u64),
        Ok(Err(e)) => CheckResult::error(e.to_string()),
        Err(_) => CheckResult::error(format!(
            "Probe timed out after {}s",
            PROBE_TIMEOUT.as_secs()
        )),
    }
}
