//! 调度配置路由
//!
//! 调度依赖共享存储：REDIS_URL 未配置时这些端点返回
//! REDIS_NOT_CONFIGURED (503)，能力缺失是显式的。

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Deserialize;
use shared::models::{ScheduleConfig, ScheduleOptions, SyncType};

use crate::core::ServerState;
use crate::services::{MappingService, ScheduleStatus};
use crate::utils::{AppError, AppResponse, AppResult, ok, ok_with_message};

pub fn router() -> Router<ServerState> {
    Router::new().route(
        "/api/schedules/{mapping_id}",
        get(get_schedule).put(upsert_schedule).delete(remove_schedule),
    )
}

/// Upsert body; the mapping id comes from the path
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBody {
    pub sync_type: SyncType,
    pub cron_pattern: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub options: ScheduleOptions,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_enabled() -> bool {
    true
}

pub async fn get_schedule(
    State(state): State<ServerState>,
    Path(mapping_id): Path<String>,
) -> AppResult<Json<AppResponse<ScheduleStatus>>> {
    let scheduler = state.require_scheduler()?;
    let status = scheduler.get_schedule(&mapping_id).await?.ok_or_else(|| {
        AppError::not_found(format!("No schedule for mapping {mapping_id}"))
    })?;
    Ok(ok(status))
}

pub async fn upsert_schedule(
    State(state): State<ServerState>,
    Path(mapping_id): Path<String>,
    Json(body): Json<ScheduleBody>,
) -> AppResult<Json<AppResponse<ScheduleConfig>>> {
    let scheduler = state.require_scheduler()?;

    // the schedule must point at an existing mapping
    MappingService::new(state.require_db()?)
        .require(&mapping_id)
        .await?;

    if body.sync_type == SyncType::Incremental && body.options.delete_stale {
        return Err(AppError::validation(
            "deleteStale is only valid for full sync schedules",
        ));
    }

    let config = ScheduleConfig {
        mapping_id,
        sync_type: body.sync_type,
        cron_pattern: body.cron_pattern,
        timezone: body.timezone,
        enabled: body.enabled,
        options: body.options,
    };
    scheduler.upsert_schedule(config.clone()).await?;
    Ok(ok_with_message(config, "Schedule saved"))
}

pub async fn remove_schedule(
    State(state): State<ServerState>,
    Path(mapping_id): Path<String>,
) -> AppResult<Json<AppResponse<bool>>> {
    let removed = state.require_scheduler()?.remove_schedule(&mapping_id).await?;
    Ok(ok_with_message(removed, "Schedule removed"))
}
