//! Webhook Job Model

use serde::{Deserialize, Serialize};

/// A signature-verified inbound change notification
///
/// Created on verified receipt, consumed exactly once by the processor.
/// The platform may redeliver the same HTTP call; processing is idempotent
/// with respect to the payload's own id/updated_at, so a duplicate job is
/// harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookJob {
    pub id: i64,
    /// Platform topic, e.g. "products/update"
    pub topic: String,
    pub shop_domain: String,
    pub payload: serde_json::Value,
    pub received_at: i64,
    /// Durable-queue processing attempts so far; bumped on each re-queue
    #[serde(default)]
    pub attempts: u32,
}

impl WebhookJob {
    pub fn new(topic: impl Into<String>, shop_domain: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: crate::util::snowflake_id(),
            topic: topic.into(),
            shop_domain: shop_domain.into(),
            payload,
            received_at: crate::util::now_millis(),
            attempts: 0,
        }
    }
}
