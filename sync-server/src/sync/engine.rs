//! Sync Engine
//!
//! Orchestrates full and incremental synchronization runs per mapping.
//!
//! 运行算法（顺序保证）：
//! 1. 注册表原子 check-and-set —— 冲突立即返回 `SYNC_ALREADY_RUNNING`
//! 2. 任何外部 I/O 之前先以 running 状态写历史条目
//! 3. 拉取/diff/upsert，单条记录失败进入有界错误列表，不中止运行
//! 4. 分类终态：completed / partial / failed
//! 5. 注册表句柄在所有退出路径上移除
//! 6. 历史条目恰好一次写入终态

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::models::{
    SyncMapping, SyncRunError, SyncRunStatus, SyncStats, SyncType,
};

use crate::connectors::PlatformSource;
use crate::db::repository::{TargetRecordRepository, UpsertOutcome};
use crate::services::{MappingService, SyncHistoryService};
use crate::sync::registry::RunningSyncRegistry;
use crate::sync::transform::apply_transforms;
use crate::utils::{AppError, AppResult};

/// Trigger for a full run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncRequest {
    pub mapping_id: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub delete_stale: bool,
    #[serde(default = "default_trigger", skip_deserializing)]
    pub triggered_by: String,
}

/// Trigger for an incremental run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalSyncRequest {
    pub mapping_id: String,
    #[serde(default)]
    pub dry_run: bool,
    /// Explicit watermark (millis); combined with the lookback-adjusted
    /// last-success time via `max`
    pub since: Option<i64>,
    pub lookback_minutes: Option<u32>,
    /// Stale deletion needs a complete view of truth, rejected here
    #[serde(default)]
    pub delete_stale: bool,
    #[serde(default = "default_trigger", skip_deserializing)]
    pub triggered_by: String,
}

fn default_trigger() -> String {
    "manual".to_string()
}

/// Result of one accepted run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub history_id: i64,
    pub status: SyncRunStatus,
    pub stats: SyncStats,
    pub duration_ms: i64,
    pub errors: Vec<SyncRunError>,
}

/// Parameters of the inner pull/diff/upsert pass
struct RunPlan {
    dry_run: bool,
    delete_stale: bool,
    /// `None` = complete dataset (full sync)
    updated_since: Option<i64>,
}

pub struct SyncEngine {
    platform: Arc<dyn PlatformSource>,
    mappings: MappingService,
    history: SyncHistoryService,
    records: TargetRecordRepository,
    registry: Arc<RunningSyncRegistry>,
    max_run_errors: usize,
    default_lookback_minutes: u32,
}

impl SyncEngine {
    pub fn new(
        platform: Arc<dyn PlatformSource>,
        mappings: MappingService,
        history: SyncHistoryService,
        records: TargetRecordRepository,
        registry: Arc<RunningSyncRegistry>,
        max_run_errors: usize,
        default_lookback_minutes: u32,
    ) -> Self {
        Self {
            platform,
            mappings,
            history,
            records,
            registry,
            max_run_errors,
            default_lookback_minutes,
        }
    }

    /// Pull the complete external dataset and reconcile it against the
    /// target store. `delete_stale` removes target records absent from the
    /// pull, which is only legal here where the pull is a complete view of truth.
    pub async fn full_sync(&self, req: FullSyncRequest) -> AppResult<SyncOutcome> {
        let mapping = self.mappings.require(&req.mapping_id).await?;
        let plan = RunPlan {
            dry_run: req.dry_run,
            delete_stale: req.delete_stale,
            updated_since: None,
        };
        self.run(mapping, SyncType::Full, &req.triggered_by, plan)
            .await
    }

    /// Pull only records changed since `max(since, last_success - lookback)`.
    ///
    /// The lookback subtraction is mandatory overlap protection against
    /// clock skew and previously failed runs; idempotent upsert makes the
    /// re-applied overlap harmless.
    pub async fn incremental_sync(&self, req: IncrementalSyncRequest) -> AppResult<SyncOutcome> {
        if req.delete_stale {
            return Err(AppError::validation(
                "deleteStale is only valid for full sync; an incremental pull has no complete view of the dataset",
            ));
        }
        let mapping = self.mappings.require(&req.mapping_id).await?;

        let lookback_ms =
            i64::from(req.lookback_minutes.unwrap_or(self.default_lookback_minutes)) * 60_000;
        let last_success = self
            .history
            .last_successful_for_mapping(&req.mapping_id)
            .await?
            .map(|entry| entry.completed_at.unwrap_or(entry.started_at) - lookback_ms);

        let updated_since = match (req.since, last_success) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let plan = RunPlan {
            dry_run: req.dry_run,
            delete_stale: false,
            updated_since,
        };
        self.run(mapping, SyncType::Incremental, &req.triggered_by, plan)
            .await
    }

    async fn run(
        &self,
        mapping: SyncMapping,
        sync_type: SyncType,
        triggered_by: &str,
        plan: RunPlan,
    ) -> AppResult<SyncOutcome> {
        // 1. Exclusivity: fail fast, never queue
        let token = self.registry.try_acquire(&mapping.id, sync_type).await?;

        // 2. History entry before any external I/O
        let entry = match self
            .history
            .start_run(&mapping.id, &mapping.name, sync_type, triggered_by)
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                self.registry.release(token).await;
                return Err(e);
            }
        };
        self.registry.attach_history(&token, entry.id).await;

        tracing::info!(
            mapping = %mapping.name,
            sync_type = %sync_type,
            dry_run = plan.dry_run,
            triggered_by,
            "Sync run {} accepted",
            entry.id
        );

        // 3. Pull/diff/upsert
        let result = self.execute(&mapping, &plan).await;

        // 4.-6. Handle removed on every path, history finalized exactly once
        self.registry.release(token).await;

        let started_at = entry.started_at;
        let (status, stats, errors) = match result {
            Ok((stats, errors)) => {
                let status = if errors.is_empty() {
                    SyncRunStatus::Completed
                } else {
                    SyncRunStatus::Partial
                };
                (status, stats, errors)
            }
            Err(e) => {
                tracing::error!(mapping = %mapping.name, "Sync run {} failed: {e}", entry.id);
                let errors = vec![SyncRunError {
                    record_id: None,
                    message: e.to_string(),
                }];
                (SyncRunStatus::Failed, SyncStats::default(), errors)
            }
        };

        if let Err(e) = self
            .history
            .finish_run(entry.id, status, stats, errors.clone())
            .await
        {
            // The run itself is done; a failed finalize must not hide its result
            tracing::error!("Failed to finalize history entry {}: {e}", entry.id);
        }

        let duration_ms = shared::util::now_millis() - started_at;
        tracing::info!(
            mapping = %mapping.name,
            status = status.as_str(),
            inserted = stats.inserted,
            updated = stats.updated,
            deleted = stats.deleted,
            errors = stats.errors_count,
            "Sync run {} finished in {duration_ms}ms",
            entry.id
        );

        Ok(SyncOutcome {
            success: status != SyncRunStatus::Failed,
            history_id: entry.id,
            status,
            stats,
            duration_ms,
            errors,
        })
    }

    /// The pull/diff/upsert pass. An `Err` here means the pull itself could
    /// not start (auth/connectivity); the run is classified `failed`.
    async fn execute(
        &self,
        mapping: &SyncMapping,
        plan: &RunPlan,
    ) -> Result<(SyncStats, Vec<SyncRunError>), AppError> {
        let mut stats = SyncStats::default();
        let mut errors: Vec<SyncRunError> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut first_page = true;

        loop {
            let page = match self
                .platform
                .fetch_page(mapping.source_entity, cursor.clone(), plan.updated_since)
                .await
            {
                Ok(page) => page,
                Err(e) if first_page => return Err(e),
                Err(e) => {
                    // Mid-pull failure after progress: record and classify partial
                    stats.errors_count += 1;
                    if errors.len() < self.max_run_errors {
                        errors.push(SyncRunError {
                            record_id: None,
                            message: format!("Pull aborted mid-run: {e}"),
                        });
                    }
                    break;
                }
            };
            first_page = false;

            for record in &page.records {
                seen.push(record.id.clone());
                match self.apply_record(mapping, plan, record).await {
                    Ok(UpsertOutcome::Inserted) => stats.inserted += 1,
                    Ok(UpsertOutcome::Updated) => stats.updated += 1,
                    Ok(UpsertOutcome::Unchanged) => {}
                    Err(message) => {
                        stats.errors_count += 1;
                        if errors.len() < self.max_run_errors {
                            errors.push(SyncRunError {
                                record_id: Some(record.id.clone()),
                                message,
                            });
                        }
                    }
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        // Stale deletion: full sync only, and never during a dry run
        if plan.delete_stale {
            let deleted = if plan.dry_run {
                self.records.count_stale(&mapping.id, &seen).await?
            } else {
                self.records.delete_stale(&mapping.id, &seen).await?
            };
            stats.deleted = deleted;
        }

        Ok((stats, errors))
    }

    /// Transform and upsert (or classify, on a dry run) one record
    async fn apply_record(
        &self,
        mapping: &SyncMapping,
        plan: &RunPlan,
        record: &crate::connectors::PlatformRecord,
    ) -> Result<UpsertOutcome, String> {
        let fields =
            apply_transforms(&mapping.transforms, &record.fields).map_err(|e| e.to_string())?;
        if plan.dry_run {
            self.records
                .classify(&mapping.id, &record.id, record.updated_at)
                .await
                .map_err(|e| e.to_string())
        } else {
            self.records
                .upsert(&mapping.id, &record.id, record.updated_at, &fields)
                .await
                .map_err(|e| e.to_string())
        }
    }
}
