//! Sync History Service
//!
//! Append-only log of every sync run. The write path is used exclusively by
//! the sync engine and the webhook processor; the query side feeds the
//! status API. No update or delete is exposed for terminal entries.

use shared::models::{SyncHistoryEntry, SyncRunError, SyncRunStatus, SyncStats, SyncType};

use crate::db::DbService;
use crate::db::repository::HistoryRepository;
use crate::utils::AppResult;

#[derive(Clone)]
pub struct SyncHistoryService {
    repo: HistoryRepository,
}

impl SyncHistoryService {
    pub fn new(db: &DbService) -> Self {
        Self {
            repo: HistoryRepository::new(db.handle()),
        }
    }

    /// Record an accepted run before any external I/O happens
    pub async fn start_run(
        &self,
        mapping_id: &str,
        mapping_name: &str,
        sync_type: SyncType,
        triggered_by: &str,
    ) -> AppResult<SyncHistoryEntry> {
        Ok(self
            .repo
            .create_running(mapping_id, mapping_name, sync_type, triggered_by)
            .await?)
    }

    /// Write the terminal status, exactly once per run
    pub async fn finish_run(
        &self,
        history_id: i64,
        status: SyncRunStatus,
        stats: SyncStats,
        errors: Vec<SyncRunError>,
    ) -> AppResult<()> {
        Ok(self.repo.finalize(history_id, status, stats, errors).await?)
    }

    pub async fn get_by_id(&self, id: i64) -> AppResult<Option<SyncHistoryEntry>> {
        Ok(self.repo.find_by_id(id).await?)
    }

    pub async fn get_recent(&self, limit: u32) -> AppResult<Vec<SyncHistoryEntry>> {
        Ok(self.repo.get_recent(limit).await?)
    }

    pub async fn get_by_status(
        &self,
        status: SyncRunStatus,
        limit: u32,
    ) -> AppResult<Vec<SyncHistoryEntry>> {
        Ok(self.repo.get_by_status(status, limit).await?)
    }

    pub async fn get_last_for_mapping(
        &self,
        mapping_id: &str,
    ) -> AppResult<Option<SyncHistoryEntry>> {
        Ok(self.repo.get_last_for_mapping(mapping_id).await?)
    }

    /// Watermark source for incremental runs
    pub async fn last_successful_for_mapping(
        &self,
        mapping_id: &str,
    ) -> AppResult<Option<SyncHistoryEntry>> {
        Ok(self.repo.last_successful_for_mapping(mapping_id).await?)
    }
}
