//! Sync History Repository
//!
//! 历史表是 append-only：`create` 以 running 状态写入，`finalize` 带
//! `WHERE status = 'running'` 条件恰好成功一次，终态条目不再可变。

use serde::Serialize;
use shared::models::{SyncHistoryEntry, SyncRunError, SyncRunStatus, SyncStats, SyncType};
use shared::util::{now_millis, snowflake_id};
use surrealdb::Surreal;
use surrealdb::engine::local::Db;

use super::{BaseRepository, RepoError, RepoResult};

const TABLE: &str = "sync_history";

const SELECT_FIELDS: &str = "*, record::id(id) AS id";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow<'a> {
    mapping_id: &'a str,
    mapping_name: &'a str,
    sync_type: SyncType,
    status: SyncRunStatus,
    started_at: i64,
    completed_at: Option<i64>,
    stats: SyncStats,
    duration_ms: Option<i64>,
    triggered_by: &'a str,
    errors: Vec<SyncRunError>,
}

#[derive(Clone)]
pub struct HistoryRepository {
    base: BaseRepository,
}

impl HistoryRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Create the entry for a freshly accepted run (status = running)
    pub async fn create_running(
        &self,
        mapping_id: &str,
        mapping_name: &str,
        sync_type: SyncType,
        triggered_by: &str,
    ) -> RepoResult<SyncHistoryEntry> {
        let id = snowflake_id();
        let row = HistoryRow {
            mapping_id,
            mapping_name,
            sync_type,
            status: SyncRunStatus::Running,
            started_at: now_millis(),
            completed_at: None,
            stats: SyncStats::default(),
            duration_ms: None,
            triggered_by,
            errors: Vec::new(),
        };
        let _created: Option<serde_json::Value> = self
            .base
            .db()
            .create((TABLE, id))
            .content(serde_json::to_value(&row).map_err(|e| RepoError::Database(e.to_string()))?)
            .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::Database("History entry vanished after create".into()))
    }

    /// Move the entry to its terminal status, exactly once
    ///
    /// The `WHERE status = 'running'` guard makes a second finalize a no-op,
    /// so a terminal entry can never be mutated again.
    pub async fn finalize(
        &self,
        id: i64,
        status: SyncRunStatus,
        stats: SyncStats,
        errors: Vec<SyncRunError>,
    ) -> RepoResult<()> {
        if !status.is_terminal() {
            return Err(RepoError::Validation(
                "finalize requires a terminal status".into(),
            ));
        }
        let completed_at = now_millis();
        self.base
            .db()
            .query(
                "UPDATE type::thing('sync_history', $id) MERGE {
                    status: $status,
                    completedAt: $completed_at,
                    stats: $stats,
                    durationMs: $completed_at - startedAt,
                    errors: $errors
                } WHERE status = 'running'",
            )
            .bind(("id", id))
            .bind(("status", status))
            .bind(("completed_at", completed_at))
            .bind(("stats", stats))
            .bind(("errors", errors))
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> RepoResult<Option<SyncHistoryEntry>> {
        let mut result = self
            .base
            .db()
            .query(format!(
                "SELECT {SELECT_FIELDS} FROM sync_history WHERE record::id(id) = $id LIMIT 1"
            ))
            .bind(("id", id))
            .await?;
        let entries: Vec<SyncHistoryEntry> = result.take(0)?;
        Ok(entries.into_iter().next())
    }

    /// Most recent entries first
    pub async fn get_recent(&self, limit: u32) -> RepoResult<Vec<SyncHistoryEntry>> {
        let mut result = self
            .base
            .db()
            .query(format!(
                "SELECT {SELECT_FIELDS} FROM sync_history ORDER BY startedAt DESC LIMIT $limit"
            ))
            .bind(("limit", limit as i64))
            .await?;
        let entries: Vec<SyncHistoryEntry> = result.take(0)?;
        Ok(entries)
    }

    pub async fn get_by_status(
        &self,
        status: SyncRunStatus,
        limit: u32,
    ) -> RepoResult<Vec<SyncHistoryEntry>> {
        let mut result = self
            .base
            .db()
            .query(format!(
                "SELECT {SELECT_FIELDS} FROM sync_history WHERE status = $status ORDER BY startedAt DESC LIMIT $limit"
            ))
            .bind(("status", status))
            .bind(("limit", limit as i64))
            .await?;
        let entries: Vec<SyncHistoryEntry> = result.take(0)?;
        Ok(entries)
    }

    /// Latest entry for one mapping, regardless of status
    pub async fn get_last_for_mapping(
        &self,
        mapping_id: &str,
    ) -> RepoResult<Option<SyncHistoryEntry>> {
        let mut result = self
            .base
            .db()
            .query(format!(
                "SELECT {SELECT_FIELDS} FROM sync_history WHERE mappingId = $mapping_id ORDER BY startedAt DESC LIMIT 1"
            ))
            .bind(("mapping_id", mapping_id.to_string()))
            .await?;
        let entries: Vec<SyncHistoryEntry> = result.take(0)?;
        Ok(entries.into_iter().next())
    }

    /// Latest successful (completed or partial) run, the incremental watermark source
    pub async fn last_successful_for_mapping(
        &self,
        mapping_id: &str,
    ) -> RepoResult<Option<SyncHistoryEntry>> {
        let mut result = self
            .base
            .db()
            .query(format!(
                "SELECT {SELECT_FIELDS} FROM sync_history WHERE mappingId = $mapping_id AND status INSIDE ['completed', 'partial'] ORDER BY startedAt DESC LIMIT 1"
            ))
            .bind(("mapping_id", mapping_id.to_string()))
            .await?;
        let entries: Vec<SyncHistoryEntry> = result.take(0)?;
        Ok(entries.into_iter().next())
    }
}
