//! Scheduler Service
//!
//! 按 cron 表达式定时触发同步运行。配置持久化在共享存储中，
//! 进程重启后恢复；没有共享存储时整个调度能力不可用
//! （REDIS_NOT_CONFIGURED），而不是静默降级。
//!
//! 多实例部署下每个实例都会在到点时触发，运行级的分布式租约保证
//! 同一 tick 只有一个实例真正执行，其余实例收到
//! SYNC_ALREADY_RUNNING 并记一条 debug 日志。

use std::str::FromStr;
use std::sync::Arc;

use chrono_tz::Tz;
use dashmap::DashMap;
use serde::Serialize;
use shared::models::{ScheduleConfig, SyncRunStatus, SyncType};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use crate::services::{SharedStoreService, SyncHistoryService};
use crate::sync::engine::{FullSyncRequest, IncrementalSyncRequest, SyncEngine};
use crate::utils::{AppError, AppResult};

/// Persisted schedule composed with the mapping's most recent run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    #[serde(flatten)]
    pub config: ScheduleConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<SyncRunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<i64>,
}

pub struct SchedulerService {
    sched: JobScheduler,
    store: SharedStoreService,
    engine: Arc<SyncEngine>,
    history: SyncHistoryService,
    /// mapping_id -> registered job id
    jobs: DashMap<String, uuid::Uuid>,
}

impl SchedulerService {
    pub async fn new(
        store: SharedStoreService,
        engine: Arc<SyncEngine>,
        history: SyncHistoryService,
    ) -> AppResult<Self> {
        let sched = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;
        Ok(Self {
            sched,
            store,
            engine,
            history,
            jobs: DashMap::new(),
        })
    }

    /// Load persisted schedules, register the enabled ones, start ticking
    pub async fn start(&self) -> AppResult<()> {
        let configs = self.store.all_schedules().await?;
        for config in configs {
            if !config.enabled {
                continue;
            }
            if let Err(e) = self.register(&config).await {
                warn!(
                    mapping_id = %config.mapping_id,
                    error = %e,
                    "Skipping persisted schedule that no longer registers"
                );
            }
        }
        self.sched
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;
        info!(schedules = self.jobs.len(), "Scheduler started");
        Ok(())
    }

    /// Create or replace the schedule for one mapping
    pub async fn upsert_schedule(&self, config: ScheduleConfig) -> AppResult<()> {
        validate(&config)?;

        // replace-then-persist: an invalid pattern must not clobber the
        // stored config, so register first
        self.unregister(&config.mapping_id).await;
        if config.enabled {
            self.register(&config).await?;
        }
        self.store.put_schedule(&config).await?;
        info!(
            mapping_id = %config.mapping_id,
            pattern = %config.cron_pattern,
            timezone = %config.timezone,
            enabled = config.enabled,
            "Schedule upserted"
        );
        Ok(())
    }

    /// Stored config composed with the latest history entry for display
    pub async fn get_schedule(&self, mapping_id: &str) -> AppResult<Option<ScheduleStatus>> {
        let Some(config) = self.store.get_schedule(mapping_id).await? else {
            return Ok(None);
        };
        let last = self.history.get_last_for_mapping(mapping_id).await?;
        Ok(Some(ScheduleStatus {
            config,
            last_run_status: last.as_ref().map(|e| e.status),
            last_run_at: last.as_ref().map(|e| e.started_at),
        }))
    }

    pub async fn remove_schedule(&self, mapping_id: &str) -> AppResult<bool> {
        self.unregister(mapping_id).await;
        let removed = self.store.remove_schedule(mapping_id).await?;
        if removed {
            info!(mapping_id, "Schedule removed");
        }
        Ok(removed)
    }

    pub async fn shutdown(&self) {
        // JobScheduler is a cloneable handle; shutdown wants it mutable
        let mut sched = self.sched.clone();
        if let Err(e) = sched.shutdown().await {
            warn!(error = %e, "Scheduler shutdown reported an error");
        }
    }

    async fn register(&self, config: &ScheduleConfig) -> AppResult<()> {
        let tz = Tz::from_str(&config.timezone)
            .map_err(|_| AppError::validation(format!("Unknown timezone: {}", config.timezone)))?;
        let pattern = normalize_cron(&config.cron_pattern);

        let engine = Arc::clone(&self.engine);
        let mapping_id = config.mapping_id.clone();
        let sync_type = config.sync_type;
        let options = config.options.clone();

        let job = Job::new_async_tz(pattern.as_str(), tz, move |_uuid, _lock| {
            let engine = Arc::clone(&engine);
            let mapping_id = mapping_id.clone();
            let options = options.clone();
            Box::pin(async move {
                fire(engine, mapping_id, sync_type, options).await;
            })
        })
        .map_err(|e| {
            AppError::validation(format!(
                "Invalid cron pattern '{}': {e}",
                config.cron_pattern
            ))
        })?;

        let job_id = self
            .sched
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to register schedule: {e}")))?;
        self.jobs.insert(config.mapping_id.clone(), job_id);
        Ok(())
    }

    async fn unregister(&self, mapping_id: &str) {
        if let Some((_, job_id)) = self.jobs.remove(mapping_id) {
            if let Err(e) = self.sched.remove(&job_id).await {
                warn!(mapping_id, error = %e, "Failed to remove scheduled job");
            }
        }
    }
}

/// One scheduler tick: run the configured sync, treat an exclusivity
/// conflict as routine (another trigger or instance got there first).
async fn fire(
    engine: Arc<SyncEngine>,
    mapping_id: String,
    sync_type: SyncType,
    options: shared::models::ScheduleOptions,
) {
    let result = match sync_type {
        SyncType::Full => {
            engine
                .full_sync(FullSyncRequest {
                    mapping_id: mapping_id.clone(),
                    dry_run: false,
                    delete_stale: options.delete_stale,
                    triggered_by: "scheduler".to_string(),
                })
                .await
        }
        SyncType::Incremental => {
            engine
                .incremental_sync(IncrementalSyncRequest {
                    mapping_id: mapping_id.clone(),
                    dry_run: false,
                    since: None,
                    lookback_minutes: Some(options.lookback_minutes),
                    delete_stale: false,
                    triggered_by: "scheduler".to_string(),
                })
                .await
        }
    };

    match result {
        Ok(outcome) => {
            info!(
                mapping_id,
                history_id = outcome.history_id,
                status = %outcome.status,
                "Scheduled sync finished"
            );
        }
        Err(AppError::SyncAlreadyRunning { .. }) => {
            debug!(mapping_id, "Scheduled tick skipped, a run is already active");
        }
        Err(e) => {
            error!(mapping_id, error = %e, "Scheduled sync failed to start");
        }
    }
}

fn validate(config: &ScheduleConfig) -> AppResult<()> {
    if config.mapping_id.trim().is_empty() {
        return Err(AppError::validation("mappingId is required"));
    }
    if config.cron_pattern.trim().is_empty() {
        return Err(AppError::validation("cronPattern is required"));
    }
    Ok(())
}

/// Accept the common 5-field crontab form by prefixing a seconds column
fn normalize_cron(pattern: &str) -> String {
    let fields = pattern.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", pattern.trim())
    } else {
        pattern.trim().to_string()
    }
}
