//! Data Models
//!
//! Cross-crate entities for the sync platform:
//!
//! - [`SyncMapping`] - 同步映射（外部集合 -> 内部实体）
//! - [`SyncHistoryEntry`] - 同步历史（append-only）
//! - [`ScheduleConfig`] - 定时同步配置
//! - [`WebhookJob`] - Webhook 任务
//! - [`RunningSync`] - 运行中同步的句柄

pub mod history;
pub mod mapping;
pub mod running;
pub mod schedule;
pub mod webhook;

pub use history::{SyncHistoryEntry, SyncRunError, SyncRunStatus, SyncStats, SyncType};
pub use mapping::{
    FieldTransform, SourceEntity, SyncMapping, SyncMappingCreate, SyncMappingUpdate, TransformKind,
};
pub use running::RunningSync;
pub use schedule::{ScheduleConfig, ScheduleOptions};
pub use webhook::WebhookJob;
