//! 平台 schema 探查路由
//!
//! 供映射编辑界面列出外部实体的可用字段。

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use shared::models::SourceEntity;

use crate::connectors::FieldDescriptor;
use crate::core::ServerState;
use crate::utils::{AppError, AppResponse, AppResult, ok};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/schema/{entity}", get(fields))
}

pub async fn fields(
    State(state): State<ServerState>,
    Path(entity): Path<String>,
) -> AppResult<Json<AppResponse<Vec<FieldDescriptor>>>> {
    let entity = parse_entity(&entity)?;
    let platform = state
        .platform
        .as_ref()
        .ok_or_else(|| AppError::not_configured("Platform connection is not configured"))?;
    Ok(ok(platform.introspect_fields(entity).await?))
}

fn parse_entity(raw: &str) -> AppResult<SourceEntity> {
    match raw {
        "products" => Ok(SourceEntity::Products),
        "inventory" => Ok(SourceEntity::Inventory),
        other => Err(AppError::validation(format!(
            "Unknown entity '{other}', expected products|inventory"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_names_parse() {
        assert_eq!(parse_entity("products").unwrap(), SourceEntity::Products);
        assert_eq!(parse_entity("inventory").unwrap(), SourceEntity::Inventory);
        assert!(parse_entity("orders").is_err());
    }
}
