//! 同步运行路由
//!
//! 触发全量/增量运行，查询运行中的同步和历史。触发端点在互斥冲突时
//! 返回 409 SYNC_ALREADY_RUNNING，调用方稍后重试。

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use shared::models::{RunningSync, SyncHistoryEntry, SyncRunStatus};

use crate::core::ServerState;
use crate::services::SyncHistoryService;
use crate::sync::engine::{FullSyncRequest, IncrementalSyncRequest, SyncOutcome};
use crate::utils::{AppError, AppResponse, AppResult, ok};

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/sync/full", post(full_sync))
        .route("/api/sync/incremental", post(incremental_sync))
        .route("/api/sync/running", get(running))
        .route("/api/sync/history", get(history))
        .route("/api/sync/history/{mapping_id}/last", get(last_for_mapping))
}

pub async fn full_sync(
    State(state): State<ServerState>,
    Json(req): Json<FullSyncRequest>,
) -> AppResult<Json<AppResponse<SyncOutcome>>> {
    let outcome = state.require_engine()?.full_sync(req).await?;
    Ok(ok(outcome))
}

pub async fn incremental_sync(
    State(state): State<ServerState>,
    Json(req): Json<IncrementalSyncRequest>,
) -> AppResult<Json<AppResponse<SyncOutcome>>> {
    let outcome = state.require_engine()?.incremental_sync(req).await?;
    Ok(ok(outcome))
}

pub async fn running(
    State(state): State<ServerState>,
) -> AppResult<Json<AppResponse<Vec<RunningSync>>>> {
    Ok(ok(state.registry.list()))
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub status: Option<String>,
}

pub async fn history(
    State(state): State<ServerState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<AppResponse<Vec<SyncHistoryEntry>>>> {
    let service = SyncHistoryService::new(state.require_db()?);
    let limit = query.limit.min(500);

    let entries = match query.status.as_deref() {
        None => service.get_recent(limit).await?,
        Some(raw) => {
            let status = parse_status(raw)?;
            service.get_by_status(status, limit).await?
        }
    };
    Ok(ok(entries))
}

pub async fn last_for_mapping(
    State(state): State<ServerState>,
    Path(mapping_id): Path<String>,
) -> AppResult<Json<AppResponse<SyncHistoryEntry>>> {
    let service = SyncHistoryService::new(state.require_db()?);
    let entry = service
        .get_last_for_mapping(&mapping_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No sync history for mapping {mapping_id}")))?;
    Ok(ok(entry))
}

fn parse_status(raw: &str) -> AppResult<SyncRunStatus> {
    match raw {
        "running" => Ok(SyncRunStatus::Running),
        "completed" => Ok(SyncRunStatus::Completed),
        "failed" => Ok(SyncRunStatus::Failed),
        "partial" => Ok(SyncRunStatus::Partial),
        other => Err(AppError::validation(format!(
            "Unknown status '{other}', expected running|completed|failed|partial"
        ))),
    }
}
