//! Shared types for the wholesale sync platform
//!
//! Data-model types used by both the sync server and tooling:
//! sync mappings, sync history, schedules, webhook jobs and the
//! running-sync handle, plus small ID/time utilities.

pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use models::{
    FieldTransform, RunningSync, ScheduleConfig, ScheduleOptions, SourceEntity, SyncHistoryEntry,
    SyncMapping, SyncRunError, SyncRunStatus, SyncStats, SyncType, WebhookJob,
};
