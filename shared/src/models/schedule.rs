//! Schedule Model

use serde::{Deserialize, Serialize};

use super::SyncType;

fn default_lookback() -> u32 {
    15
}

/// Per-schedule run options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOptions {
    /// Overlap window for incremental runs (minutes)
    #[serde(default = "default_lookback")]
    pub lookback_minutes: u32,
    /// Remove target records absent from the pull (full runs only)
    #[serde(default)]
    pub delete_stale: bool,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            lookback_minutes: default_lookback(),
            delete_stale: false,
        }
    }
}

/// Persisted cron schedule for one mapping
///
/// 每个映射最多一条；由运营人员 upsert，调度器在共享存储可用时加载。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub mapping_id: String,
    pub sync_type: SyncType,
    /// Cron expression evaluated in `timezone`
    pub cron_pattern: String,
    /// IANA timezone name, e.g. "Europe/Berlin"
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
