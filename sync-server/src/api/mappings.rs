//! 同步映射 CRUD 路由

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use shared::models::{SyncMapping, SyncMappingCreate, SyncMappingUpdate};

use crate::core::ServerState;
use crate::services::MappingService;
use crate::utils::{AppResponse, AppResult, ok, ok_with_message};

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/mappings", get(list).post(create))
        .route(
            "/api/mappings/{id}",
            get(get_one).put(update).delete(delete),
        )
}

fn service(state: &ServerState) -> AppResult<MappingService> {
    Ok(MappingService::new(state.require_db()?))
}

pub async fn list(
    State(state): State<ServerState>,
) -> AppResult<Json<AppResponse<Vec<SyncMapping>>>> {
    Ok(ok(service(&state)?.get_all().await?))
}

pub async fn get_one(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<AppResponse<SyncMapping>>> {
    Ok(ok(service(&state)?.require(&id).await?))
}

pub async fn create(
    State(state): State<ServerState>,
    Json(data): Json<SyncMappingCreate>,
) -> AppResult<Json<AppResponse<SyncMapping>>> {
    let mapping = service(&state)?.create(data).await?;
    Ok(ok_with_message(mapping, "Mapping created"))
}

pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(data): Json<SyncMappingUpdate>,
) -> AppResult<Json<AppResponse<SyncMapping>>> {
    let mapping = service(&state)?.update(&id, data).await?;
    Ok(ok_with_message(mapping, "Mapping updated"))
}

pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<AppResponse<bool>>> {
    if !service(&state)?.delete(&id).await? {
        return Err(crate::utils::AppError::not_found(format!(
            "Mapping {id} not found"
        )));
    }
    Ok(ok_with_message(true, "Mapping deleted"))
}
