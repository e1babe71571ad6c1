//! Sync engine integration tests against an in-memory store and a fake
//! platform connector.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use std::sync::Mutex;
use shared::models::{
    FieldTransform, SourceEntity, SyncMappingCreate, SyncRunStatus, TransformKind,
};
use sync_server::connectors::{FieldDescriptor, PlatformPage, PlatformRecord, PlatformSource};
use sync_server::db::DbService;
use sync_server::db::repository::TargetRecordRepository;
use sync_server::services::{MappingService, SyncHistoryService};
use sync_server::sync::engine::{FullSyncRequest, IncrementalSyncRequest};
use sync_server::sync::registry::RunningSyncRegistry;
use sync_server::utils::AppError;
use sync_server::SyncEngine;

const PAGE_SIZE: usize = 250;

/// In-memory platform double. Pages through its record list, captures the
/// `updated_since` watermark of every pull, and can be told to fail or
/// to respond slowly.
struct FakePlatform {
    records: Mutex<Vec<PlatformRecord>>,
    captured_since: Mutex<Vec<Option<i64>>>,
    fail_pulls: AtomicBool,
    delay: Option<Duration>,
}

impl FakePlatform {
    fn new(records: Vec<PlatformRecord>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            captured_since: Mutex::new(Vec::new()),
            fail_pulls: AtomicBool::new(false),
            delay: None,
        })
    }

    fn slow(records: Vec<PlatformRecord>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            captured_since: Mutex::new(Vec::new()),
            fail_pulls: AtomicBool::new(false),
            delay: Some(delay),
        })
    }

    fn set_records(&self, records: Vec<PlatformRecord>) {
        *self.records.lock().unwrap() = records;
    }

    fn remove_first(&self, n: usize) {
        self.records.lock().unwrap().drain(..n);
    }

    fn last_since(&self) -> Option<i64> {
        self.captured_since.lock().unwrap().last().copied().flatten()
    }
}

#[async_trait]
impl PlatformSource for FakePlatform {
    async fn test_connection(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn fetch_page(
        &self,
        _entity: SourceEntity,
        cursor: Option<String>,
        updated_since: Option<i64>,
    ) -> Result<PlatformPage, AppError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_pulls.load(Ordering::SeqCst) {
            return Err(AppError::internal("platform unreachable"));
        }

        let offset: usize = cursor.as_deref().map_or(0, |c| c.parse().unwrap_or(0));
        if offset == 0 {
            self.captured_since.lock().unwrap().push(updated_since);
        }

        let filtered: Vec<PlatformRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| updated_since.is_none_or(|since| r.updated_at >= since))
            .cloned()
            .collect();

        let end = (offset + PAGE_SIZE).min(filtered.len());
        let next_cursor = (end < filtered.len()).then(|| end.to_string());
        Ok(PlatformPage {
            records: filtered[offset..end].to_vec(),
            next_cursor,
        })
    }

    async fn introspect_fields(
        &self,
        _entity: SourceEntity,
    ) -> Result<Vec<FieldDescriptor>, AppError> {
        Ok(Vec::new())
    }
}

fn product(id: usize, updated_at: i64) -> PlatformRecord {
    PlatformRecord {
        id: format!("prod-{id}"),
        updated_at,
        fields: serde_json::json!({
            "title": format!("Product {id}"),
            "price": "19.90",
        }),
    }
}

struct Harness {
    engine: Arc<SyncEngine>,
    mappings: MappingService,
    history: SyncHistoryService,
    records: TargetRecordRepository,
}

async fn harness(platform: Arc<FakePlatform>) -> Harness {
    let db = DbService::memory().await.expect("in-memory db");
    let registry = Arc::new(RunningSyncRegistry::new(None, 60_000));
    let engine = Arc::new(SyncEngine::new(
        platform,
        MappingService::new(&db),
        SyncHistoryService::new(&db),
        TargetRecordRepository::new(db.handle()),
        registry,
        20,
        15,
    ));
    Harness {
        engine,
        mappings: MappingService::new(&db),
        history: SyncHistoryService::new(&db),
        records: TargetRecordRepository::new(db.handle()),
    }
}

async fn create_mapping(h: &Harness, transforms: Vec<FieldTransform>) -> String {
    h.mappings
        .create(SyncMappingCreate {
            name: "products-to-catalog".to_string(),
            source_entity: SourceEntity::Products,
            target_table: "catalog_product".to_string(),
            transforms,
            webhook_enabled: true,
        })
        .await
        .expect("create mapping")
        .id
}

fn full_request(mapping_id: &str, dry_run: bool, delete_stale: bool) -> FullSyncRequest {
    FullSyncRequest {
        mapping_id: mapping_id.to_string(),
        dry_run,
        delete_stale,
        triggered_by: "manual".to_string(),
    }
}

#[tokio::test]
async fn full_sync_inserts_everything_then_reconciles_deletions() {
    let now = shared::util::now_millis();
    let platform = FakePlatform::new((0..1000).map(|i| product(i, now)).collect());
    let h = harness(Arc::clone(&platform)).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    let first = h
        .engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("first run");
    assert!(first.success);
    assert_eq!(first.status, SyncRunStatus::Completed);
    assert_eq!(first.stats.inserted, 1000);
    assert_eq!(first.stats.deleted, 0);
    assert_eq!(h.records.count_for_mapping(&mapping_id).await.unwrap(), 1000);

    // 10 records disappear on the platform side
    platform.remove_first(10);

    let second = h
        .engine
        .full_sync(full_request(&mapping_id, false, true))
        .await
        .expect("second run");
    assert_eq!(second.status, SyncRunStatus::Completed);
    assert_eq!(second.stats.deleted, 10);
    assert_eq!(h.records.count_for_mapping(&mapping_id).await.unwrap(), 990);
}

#[tokio::test]
async fn dry_run_reports_the_same_stats_without_writing() {
    let now = shared::util::now_millis();
    let platform = FakePlatform::new((0..42).map(|i| product(i, now)).collect());
    let h = harness(platform).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    let preview = h
        .engine
        .full_sync(full_request(&mapping_id, true, false))
        .await
        .expect("dry run");
    assert_eq!(preview.stats.inserted, 42);
    assert_eq!(h.records.count_for_mapping(&mapping_id).await.unwrap(), 0);

    let real = h
        .engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("real run");
    assert_eq!(real.stats.inserted, preview.stats.inserted);
    assert_eq!(h.records.count_for_mapping(&mapping_id).await.unwrap(), 42);
}

#[tokio::test]
async fn dry_run_counts_stale_deletions_without_deleting() {
    let now = shared::util::now_millis();
    let platform = FakePlatform::new((0..20).map(|i| product(i, now)).collect());
    let h = harness(Arc::clone(&platform)).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    h.engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("seed run");
    platform.remove_first(5);

    let preview = h
        .engine
        .full_sync(full_request(&mapping_id, true, true))
        .await
        .expect("dry run");
    assert_eq!(preview.stats.deleted, 5);
    assert_eq!(h.records.count_for_mapping(&mapping_id).await.unwrap(), 20);
}

#[tokio::test]
async fn incremental_watermark_is_last_success_minus_lookback() {
    let now = shared::util::now_millis();
    let platform = FakePlatform::new((0..10).map(|i| product(i, now)).collect());
    let h = harness(Arc::clone(&platform)).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    h.engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("full run");

    let last = h
        .history
        .last_successful_for_mapping(&mapping_id)
        .await
        .unwrap()
        .expect("history entry");
    let completed_at = last.completed_at.expect("terminal entry has completed_at");

    h.engine
        .incremental_sync(IncrementalSyncRequest {
            mapping_id: mapping_id.clone(),
            dry_run: false,
            since: None,
            lookback_minutes: None,
            delete_stale: false,
            triggered_by: "manual".to_string(),
        })
        .await
        .expect("incremental run");

    // engine default lookback is 15 minutes
    assert_eq!(platform.last_since(), Some(completed_at - 15 * 60_000));
}

#[tokio::test]
async fn failed_runs_never_advance_the_watermark() {
    let now = shared::util::now_millis();
    let platform = FakePlatform::new((0..5).map(|i| product(i, now)).collect());
    let h = harness(Arc::clone(&platform)).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    h.engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("baseline run");
    let baseline = h
        .history
        .last_successful_for_mapping(&mapping_id)
        .await
        .unwrap()
        .expect("baseline entry");
    let completed_at = baseline.completed_at.expect("terminal entry");

    let incremental = |mapping_id: &str| IncrementalSyncRequest {
        mapping_id: mapping_id.to_string(),
        dry_run: false,
        since: None,
        lookback_minutes: None,
        delete_stale: false,
        triggered_by: "manual".to_string(),
    };

    // A record changes, then the next incremental pull dies on page one
    platform.set_records(vec![product(99, now + 1)]);
    platform.fail_pulls.store(true, Ordering::SeqCst);
    let failed = h
        .engine
        .incremental_sync(incremental(&mapping_id))
        .await
        .expect("run accepted despite the pull failure");
    assert_eq!(failed.status, SyncRunStatus::Failed);

    // The failed run is not a watermark source
    let last_success = h
        .history
        .last_successful_for_mapping(&mapping_id)
        .await
        .unwrap()
        .expect("entry");
    assert_eq!(last_success.id, baseline.id);

    // The retry still pulls from the pre-failure success minus lookback,
    // so the change that landed during the outage survives
    platform.fail_pulls.store(false, Ordering::SeqCst);
    let retry = h
        .engine
        .incremental_sync(incremental(&mapping_id))
        .await
        .expect("retry");
    assert_eq!(platform.last_since(), Some(completed_at - 15 * 60_000));
    assert_eq!(retry.stats.inserted, 1);
}

#[tokio::test]
async fn explicit_since_wins_when_newer_than_history() {
    let now = shared::util::now_millis();
    let platform = FakePlatform::new((0..5).map(|i| product(i, now)).collect());
    let h = harness(Arc::clone(&platform)).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    h.engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("full run");

    let since = shared::util::now_millis() + 60_000;
    h.engine
        .incremental_sync(IncrementalSyncRequest {
            mapping_id: mapping_id.clone(),
            dry_run: false,
            since: Some(since),
            lookback_minutes: Some(15),
            delete_stale: false,
            triggered_by: "manual".to_string(),
        })
        .await
        .expect("incremental run");

    assert_eq!(platform.last_since(), Some(since));
}

#[tokio::test]
async fn incremental_rejects_delete_stale() {
    let platform = FakePlatform::new(Vec::new());
    let h = harness(platform).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    let err = h
        .engine
        .incremental_sync(IncrementalSyncRequest {
            mapping_id,
            dry_run: false,
            since: None,
            lookback_minutes: None,
            delete_stale: true,
            triggered_by: "manual".to_string(),
        })
        .await
        .expect_err("must be rejected");
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn concurrent_runs_for_one_mapping_conflict() {
    let now = shared::util::now_millis();
    let platform = FakePlatform::slow(
        (0..10).map(|i| product(i, now)).collect(),
        Duration::from_millis(300),
    );
    let h = harness(platform).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    let (a, b) = tokio::join!(
        h.engine.full_sync(full_request(&mapping_id, false, false)),
        h.engine.full_sync(full_request(&mapping_id, false, false)),
    );

    let outcomes = [a, b];
    let admitted = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1, "exactly one run admitted");
    let conflict = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one conflict");
    assert_eq!(conflict.code(), "SYNC_ALREADY_RUNNING");
}

#[tokio::test]
async fn per_record_failures_yield_partial_with_bounded_errors() {
    let now = shared::util::now_millis();
    let mut records: Vec<PlatformRecord> = (0..50).map(|i| product(i, now)).collect();
    // 30 records with an unparsable price, above the 20-error cap
    for (i, record) in records.iter_mut().enumerate().take(30) {
        record.fields["price"] = serde_json::json!(format!("not-a-number-{i}"));
    }
    let platform = FakePlatform::new(records);
    let h = harness(platform).await;
    let mapping_id = create_mapping(
        &h,
        vec![FieldTransform {
            source: "price".to_string(),
            target: "price".to_string(),
            kind: TransformKind::Number,
        }],
    )
    .await;

    let outcome = h
        .engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("run completes as partial");
    assert!(outcome.success);
    assert_eq!(outcome.status, SyncRunStatus::Partial);
    assert_eq!(outcome.stats.inserted, 20);
    assert_eq!(outcome.stats.errors_count, 30);
    assert_eq!(outcome.errors.len(), 20, "error list is bounded");
}

#[tokio::test]
async fn first_page_failure_classifies_the_run_as_failed() {
    let now = shared::util::now_millis();
    let platform = FakePlatform::new((0..10).map(|i| product(i, now)).collect());
    platform.fail_pulls.store(true, Ordering::SeqCst);
    let h = harness(Arc::clone(&platform)).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    let outcome = h
        .engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("classified failure is not a transport error");
    assert!(!outcome.success);
    assert_eq!(outcome.status, SyncRunStatus::Failed);
    assert_eq!(outcome.stats.inserted, 0);
    assert!(!outcome.errors.is_empty());

    // the history entry is finalized, never left running
    let entry = h
        .history
        .get_by_id(outcome.history_id)
        .await
        .unwrap()
        .expect("entry exists");
    assert_eq!(entry.status, SyncRunStatus::Failed);

    // and the mapping is immediately runnable again
    platform.fail_pulls.store(false, Ordering::SeqCst);
    let retry = h
        .engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("retry admitted");
    assert!(retry.success);
}

#[tokio::test]
async fn unknown_mapping_is_not_found() {
    let platform = FakePlatform::new(Vec::new());
    let h = harness(platform).await;

    let err = h
        .engine
        .full_sync(full_request("missing", false, false))
        .await
        .expect_err("unknown mapping");
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn redelivered_updates_are_idempotent() {
    let now = shared::util::now_millis();
    let platform = FakePlatform::new((0..8).map(|i| product(i, now)).collect());
    let h = harness(Arc::clone(&platform)).await;
    let mapping_id = create_mapping(&h, Vec::new()).await;

    h.engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("first run");

    // same data pulled again: no inserts, updates allowed, no growth
    let again = h
        .engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("second run");
    assert_eq!(again.stats.inserted, 0);
    assert_eq!(h.records.count_for_mapping(&mapping_id).await.unwrap(), 8);

    // a stale copy (older updated_at) never overwrites the stored row
    platform.set_records(vec![product(0, now - 60_000)]);
    let stale = h
        .engine
        .full_sync(full_request(&mapping_id, false, false))
        .await
        .expect("stale run");
    assert_eq!(stale.stats.inserted, 0);
    assert_eq!(stale.stats.updated, 0);
}
