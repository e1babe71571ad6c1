//! Webhook ingestion pipeline
//!
//! 验证 → 入队 → 处理：
//! - [`verify`] - 原始请求体的 HMAC-SHA256 签名校验
//! - [`queue`] - 持久化队列（Redis）或内联处理降级
//! - [`processor`] - 把变更幂等地应用到目标记录并写历史

pub mod processor;
pub mod queue;
pub mod verify;

pub use processor::{WebhookOutcome, WebhookProcessor};
pub use queue::{WebhookConsumer, WebhookQueue, WebhookSubmission};
pub use verify::verify_signature;
