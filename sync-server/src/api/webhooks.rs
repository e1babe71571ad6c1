//! Webhook 摄入路由
//!
//! `HEAD` 返回 200 空体（平台端点校验）。`POST` 读取原始字节，
//! 先验签后入队；签名缺失/不匹配/密钥未配置一律 401，被拒绝的
//! webhook 永远不会入队或处理。

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::head,
};
use shared::models::WebhookJob;
use tracing::warn;

use crate::core::ServerState;
use crate::utils::{AppError, AppResponse, AppResult, ok};
use crate::webhooks::{WebhookSubmission, verify_signature};

const SIGNATURE_HEADER: &str = "x-platform-hmac-sha256";
const TOPIC_HEADER: &str = "x-platform-topic";
const SHOP_DOMAIN_HEADER: &str = "x-platform-shop-domain";

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/webhooks/platform", head(handshake).post(receive))
}

/// 平台端点校验握手
pub async fn handshake() -> StatusCode {
    StatusCode::OK
}

pub async fn receive(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<AppResponse<WebhookSubmission>>> {
    let Some(secret) = state.webhook_secret() else {
        warn!("Webhook received but PLATFORM_WEBHOOK_SECRET is not set, rejecting");
        return Err(AppError::WebhookUnauthorized);
    };

    let signature = header_str(&headers, SIGNATURE_HEADER).unwrap_or_default();
    verify_signature(secret, &body, signature)?;

    let topic = header_str(&headers, TOPIC_HEADER)
        .ok_or_else(|| AppError::validation("Missing topic header"))?;
    let shop_domain = header_str(&headers, SHOP_DOMAIN_HEADER).unwrap_or_default();

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::validation(format!("Webhook body is not valid JSON: {e}")))?;

    let job = WebhookJob::new(topic, shop_domain, payload);
    let submission = state.require_queue()?.submit(job).await?;
    Ok(ok(submission))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
