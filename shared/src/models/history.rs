//! Sync History Model
//!
//! 同步历史为 append-only：运行开始时以 `running` 状态创建，
//! 结束时恰好一次地写入终态，此后不再修改。

use serde::{Deserialize, Serialize};

/// Kind of sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Full,
    Incremental,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal (and the one transient) status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    /// Entry created, run in flight
    Running,
    /// Finished with zero record errors
    Completed,
    /// The pull itself failed before any records were processed
    Failed,
    /// Some records failed but the run made progress
    Partial,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub errors_count: u64,
}

/// One captured per-record failure (bounded list per run)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunError {
    /// External record ID, if known at the point of failure
    pub record_id: Option<String>,
    pub message: String,
}

/// Sync history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistoryEntry {
    pub id: i64,
    pub mapping_id: String,
    /// Denormalized for display; the mapping may be renamed later
    pub mapping_name: String,
    pub sync_type: SyncType,
    pub status: SyncRunStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub stats: SyncStats,
    pub duration_ms: Option<i64>,
    /// "manual" | "scheduler" | "webhook"
    pub triggered_by: String,
    #[serde(default)]
    pub errors: Vec<SyncRunError>,
}
