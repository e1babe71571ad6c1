//! 统一错误处理
//!
//! 提供应用级错误类型和响应结构：
//! - [`AppError`] - 应用错误枚举
//! - [`AppResponse`] - API 响应结构
//!
//! # 错误码规范
//!
//! | 错误码 | HTTP | 说明 |
//! |--------|------|------|
//! | VALIDATION_ERROR | 400 | 请求参数无效 |
//! | NOT_FOUND | 404 | 资源不存在 |
//! | NOT_CONFIGURED | 503 | 数据库/平台未配置 |
//! | SYNC_ALREADY_RUNNING | 409 | 同映射已有运行中的同步 |
//! | REDIS_NOT_CONFIGURED | 503 | 依赖共享存储的功能不可用 |
//! | UNAUTHORIZED | 401 | Webhook 签名无效 |
//! | INTERNAL_ERROR | 500 | 内部错误 |
//!
//! # 使用示例
//!
//! ```ignore
//! // 返回错误
//! Err(AppError::not_found("Mapping not found"))
//!
//! // 返回成功响应
//! Ok(ok(data))
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use shared::models::SyncType;
use tracing::error;

/// API 统一响应结构
///
/// ```json
/// {
///   "code": "OK",
///   "message": "Success",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AppResponse<T> {
    /// 错误码 ("OK" 表示成功)
    pub code: String,
    /// 消息
    pub message: String,
    /// 响应数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// 应用错误枚举
///
/// # 错误分类
///
/// | 分类 | 说明 |
/// |------|------|
/// | 配置缺失 | 数据库/平台/共享存储未配置 |
/// | 并发冲突 | 同映射已有运行中的同步 |
/// | 业务逻辑错误 | 资源不存在、验证失败 |
/// | 系统错误 | 数据库错误、内部错误 |
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== 业务逻辑错误 (4xx) ==========
    #[error("Validation failed: {0}")]
    /// 验证失败 (400)
    Validation(String),

    #[error("Resource not found: {0}")]
    /// 资源不存在 (404)
    NotFound(String),

    #[error("Webhook authentication failed")]
    /// Webhook 签名无效 (401)
    WebhookUnauthorized,

    #[error("Sync already running for mapping {mapping_id} ({sync_type})")]
    /// 并发冲突 (409) — 携带冲突运行的类型，调用方可稍后重试
    SyncAlreadyRunning {
        mapping_id: String,
        sync_type: SyncType,
    },

    // ========== 能力缺失 (503) ==========
    #[error("Not configured: {0}")]
    /// 数据库或平台连接未配置 (503)
    NotConfigured(String),

    #[error("Shared store not configured: {0}")]
    /// 依赖 Redis 的功能不可用 (503)
    RedisNotConfigured(String),

    // ========== 系统错误 (5xx) ==========
    #[error("Database error: {0}")]
    /// 数据库错误 (500)
    Database(String),

    #[error("Internal server error: {0}")]
    /// 内部错误 (500)
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Machine-readable error code surfaced to callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::WebhookUnauthorized => "UNAUTHORIZED",
            Self::SyncAlreadyRunning { .. } => "SYNC_ALREADY_RUNNING",
            Self::NotConfigured(_) => "NOT_CONFIGURED",
            Self::RedisNotConfigured(_) => "REDIS_NOT_CONFIGURED",
            Self::Database(_) => "INTERNAL_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::WebhookUnauthorized => {
                (StatusCode::UNAUTHORIZED, "Invalid webhook signature".into())
            }
            AppError::SyncAlreadyRunning { sync_type, .. } => (
                StatusCode::CONFLICT,
                format!("A {sync_type} sync is already running for this mapping"),
            ),
            AppError::NotConfigured(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::RedisNotConfigured(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),

            // Internal detail is logged, not echoed to untrusted callers
            AppError::Database(msg) => {
                error!(target: "database", error = %msg, "Database error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".into())
            }
            AppError::Internal(msg) => {
                error!(target: "internal", error = %msg, "Internal error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        let body = Json(AppResponse::<()> {
            code: code.to_string(),
            message,
            data: None,
        });

        (status, body).into_response()
    }
}

impl From<crate::db::repository::RepoError> for AppError {
    fn from(e: crate::db::repository::RepoError) -> Self {
        use crate::db::repository::RepoError;
        match e {
            RepoError::NotFound(msg) => AppError::NotFound(msg),
            RepoError::Duplicate(msg) => AppError::Validation(msg),
            RepoError::Validation(msg) => AppError::Validation(msg),
            RepoError::Database(msg) => AppError::Database(msg),
        }
    }
}

/// Result alias for handler and service code
pub type AppResult<T> = Result<T, AppError>;

// ========== Helper functions ==========

/// Create a successful response
pub fn ok<T: Serialize>(data: T) -> Json<AppResponse<T>> {
    Json(AppResponse {
        code: "OK".to_string(),
        message: "Success".to_string(),
        data: Some(data),
    })
}

/// Create a successful response with custom message
pub fn ok_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Json<AppResponse<T>> {
    Json(AppResponse {
        code: "OK".to_string(),
        message: message.into(),
        data: Some(data),
    })
}
