//! Running Sync Handle

use serde::{Deserialize, Serialize};

use super::SyncType;

/// Ephemeral exclusivity marker, at most one per mapping at any instant
///
/// Created atomically when a run is accepted, removed unconditionally when
/// the run terminates. This is the core concurrency invariant of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningSync {
    pub mapping_id: String,
    pub sync_type: SyncType,
    pub started_at: i64,
    pub history_id: i64,
}
