//! Webhook processing tests: signature gate, idempotent application,
//! deletes, and history recording.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;
use shared::models::{SourceEntity, SyncMappingCreate, SyncRunStatus, WebhookJob};
use sync_server::api::webhooks::{handshake, receive};
use sync_server::core::{Config, ServerState};
use sync_server::db::DbService;
use sync_server::db::repository::TargetRecordRepository;
use sync_server::services::{MappingService, SyncHistoryService};
use sync_server::sync::registry::RunningSyncRegistry;
use sync_server::webhooks::{WebhookProcessor, WebhookQueue, verify_signature};
use sync_server::webhooks::verify::sign;
use tokio_util::sync::CancellationToken;

struct Harness {
    processor: WebhookProcessor,
    records: TargetRecordRepository,
    history: SyncHistoryService,
    mapping_id: String,
}

async fn harness(webhook_enabled: bool) -> Harness {
    let db = DbService::memory().await.expect("in-memory db");
    let mapping = MappingService::new(&db)
        .create(SyncMappingCreate {
            name: "products-to-catalog".to_string(),
            source_entity: SourceEntity::Products,
            target_table: "catalog_product".to_string(),
            transforms: Vec::new(),
            webhook_enabled,
        })
        .await
        .expect("create mapping");
    Harness {
        processor: WebhookProcessor::new(&db),
        records: TargetRecordRepository::new(db.handle()),
        history: SyncHistoryService::new(&db),
        mapping_id: mapping.id,
    }
}

fn test_config(secret: Option<&str>) -> Config {
    Config {
        http_port: 0,
        work_dir: ".".to_string(),
        environment: "test".to_string(),
        database_path: None,
        platform_api_url: None,
        platform_access_token: None,
        webhook_secret: secret.map(str::to_string),
        redis_url: None,
        platform_page_size: 100,
        default_lookback_minutes: 15,
        max_run_errors: 20,
        lease_ttl_ms: 60_000,
    }
}

/// A server state wired for webhook ingestion only: database + inline
/// queue, no platform, no shared store.
async fn ingest_state(secret: Option<&str>) -> (ServerState, Harness) {
    let db = DbService::memory().await.expect("in-memory db");
    let mapping = MappingService::new(&db)
        .create(SyncMappingCreate {
            name: "products-to-catalog".to_string(),
            source_entity: SourceEntity::Products,
            target_table: "catalog_product".to_string(),
            transforms: Vec::new(),
            webhook_enabled: true,
        })
        .await
        .expect("create mapping");
    let state = ServerState {
        config: test_config(secret),
        db: Some(db.clone()),
        store: None,
        platform: None,
        engine: None,
        queue: Some(WebhookQueue::new(None, WebhookProcessor::new(&db))),
        scheduler: None,
        registry: Arc::new(RunningSyncRegistry::new(None, 60_000)),
        shutdown: CancellationToken::new(),
    };
    let h = Harness {
        processor: WebhookProcessor::new(&db),
        records: TargetRecordRepository::new(db.handle()),
        history: SyncHistoryService::new(&db),
        mapping_id: mapping.id,
    };
    (state, h)
}

fn product_job(id: u64, updated_at: &str, title: &str) -> WebhookJob {
    WebhookJob::new(
        "products/update",
        "demo.myplatform.com",
        json!({ "id": id, "updated_at": updated_at, "title": title }),
    )
}

#[tokio::test]
async fn update_webhook_writes_the_record_and_history() {
    let h = harness(true).await;

    let outcome = h
        .processor
        .process(&product_job(42, "2026-08-01T09:00:00Z", "Widget"))
        .await
        .expect("process");
    assert!(outcome.success);
    assert_eq!(outcome.records_written, 1);

    let stored = h
        .records
        .get(&h.mapping_id, "42")
        .await
        .unwrap()
        .expect("record stored");
    assert_eq!(stored.fields["title"], "Widget");

    let entry = h
        .history
        .get_last_for_mapping(&h.mapping_id)
        .await
        .unwrap()
        .expect("history written");
    assert_eq!(entry.triggered_by, "webhook");
    assert_eq!(entry.status, SyncRunStatus::Completed);
    assert_eq!(entry.stats.inserted, 1);
}

#[tokio::test]
async fn redelivery_does_not_double_count() {
    let h = harness(true).await;
    let job = product_job(42, "2026-08-01T09:00:00Z", "Widget");

    let first = h.processor.process(&job).await.expect("first delivery");
    assert_eq!(first.records_written, 1);

    // the platform retries the exact same delivery
    let second = h.processor.process(&job).await.expect("second delivery");
    assert!(second.success);
    assert_eq!(second.records_written, 0, "stale redelivery writes nothing");
}

#[tokio::test]
async fn older_payload_never_overwrites_newer_state() {
    let h = harness(true).await;

    h.processor
        .process(&product_job(42, "2026-08-02T12:00:00Z", "Widget v2"))
        .await
        .expect("newer delivery");
    h.processor
        .process(&product_job(42, "2026-08-01T09:00:00Z", "Widget v1"))
        .await
        .expect("out-of-order delivery");

    let stored = h.records.get(&h.mapping_id, "42").await.unwrap().unwrap();
    assert_eq!(stored.fields["title"], "Widget v2");
}

#[tokio::test]
async fn delete_webhook_removes_the_record() {
    let h = harness(true).await;
    h.processor
        .process(&product_job(42, "2026-08-01T09:00:00Z", "Widget"))
        .await
        .expect("seed");

    let delete = WebhookJob::new(
        "products/delete",
        "demo.myplatform.com",
        json!({ "id": 42 }),
    );
    let outcome = h.processor.process(&delete).await.expect("delete");
    assert!(outcome.success);
    assert_eq!(outcome.records_written, 1);
    assert!(h.records.get(&h.mapping_id, "42").await.unwrap().is_none());

    // deleting an already-absent record is a no-op, not an error
    let again = h.processor.process(&delete).await.expect("redelivery");
    assert!(again.success);
    assert_eq!(again.records_written, 0);
}

#[tokio::test]
async fn disabled_mappings_are_never_touched() {
    let h = harness(false).await;

    let outcome = h
        .processor
        .process(&product_job(42, "2026-08-01T09:00:00Z", "Widget"))
        .await
        .expect("process");
    assert!(outcome.success);
    assert_eq!(outcome.records_written, 0);
    assert!(h.records.get(&h.mapping_id, "42").await.unwrap().is_none());
    assert!(
        h.history
            .get_last_for_mapping(&h.mapping_id)
            .await
            .unwrap()
            .is_none(),
        "no history entry for an untargeted job"
    );
}

#[tokio::test]
async fn unknown_topics_are_acknowledged_and_skipped() {
    let h = harness(true).await;
    let job = WebhookJob::new("orders/create", "demo.myplatform.com", json!({ "id": 7 }));

    let outcome = h.processor.process(&job).await.expect("process");
    assert!(outcome.success);
    assert_eq!(outcome.records_written, 0);
}

#[tokio::test]
async fn inline_queue_processes_within_the_call() {
    let db = DbService::memory().await.expect("in-memory db");
    MappingService::new(&db)
        .create(SyncMappingCreate {
            name: "products-to-catalog".to_string(),
            source_entity: SourceEntity::Products,
            target_table: "catalog_product".to_string(),
            transforms: Vec::new(),
            webhook_enabled: true,
        })
        .await
        .expect("create mapping");

    // no shared store: submit() degrades to inline processing
    let queue = WebhookQueue::new(None, WebhookProcessor::new(&db));
    assert!(!queue.is_durable());

    let submission = queue
        .submit(product_job(42, "2026-08-01T09:00:00Z", "Widget"))
        .await
        .expect("submit");
    let value = serde_json::to_value(&submission).unwrap();
    assert_eq!(value["success"], true);
    assert_eq!(value["recordsWritten"], 1);
}

#[tokio::test]
async fn tampered_ingestion_never_reaches_queue_or_history() {
    let (state, h) = ingest_state(Some("whsec_ingest")).await;

    let body = json!({ "id": 7, "updated_at": "2026-08-01T09:00:00Z", "title": "Widget" })
        .to_string();
    let mut headers = HeaderMap::new();
    headers.insert("x-platform-topic", HeaderValue::from_static("products/update"));
    headers.insert(
        "x-platform-hmac-sha256",
        HeaderValue::from_str(&sign("wrong-secret", body.as_bytes())).unwrap(),
    );

    let err = receive(State(state.clone()), headers, Bytes::from(body.clone()))
        .await
        .expect_err("tampered signature must be rejected");
    assert_eq!(err.code(), "UNAUTHORIZED");

    // A missing signature header fails the same way
    let mut headers = HeaderMap::new();
    headers.insert("x-platform-topic", HeaderValue::from_static("products/update"));
    let err = receive(State(state), headers, Bytes::from(body))
        .await
        .expect_err("missing signature must be rejected");
    assert_eq!(err.code(), "UNAUTHORIZED");

    // Neither call touched the store or the audit trail
    assert!(h.records.get(&h.mapping_id, "7").await.unwrap().is_none());
    assert!(h.history.get_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn valid_ingestion_passes_the_gate_end_to_end() {
    let (state, h) = ingest_state(Some("whsec_ingest")).await;

    let body = json!({ "id": 7, "updated_at": "2026-08-01T09:00:00Z", "title": "Widget" })
        .to_string();
    let mut headers = HeaderMap::new();
    headers.insert("x-platform-topic", HeaderValue::from_static("products/update"));
    headers.insert(
        "x-platform-hmac-sha256",
        HeaderValue::from_str(&sign("whsec_ingest", body.as_bytes())).unwrap(),
    );

    receive(State(state), headers, Bytes::from(body))
        .await
        .expect("valid signature is accepted");
    assert!(h.records.get(&h.mapping_id, "7").await.unwrap().is_some());
}

#[tokio::test]
async fn handshake_returns_ok_with_an_empty_body() {
    let response = handshake().await.into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 16)
        .await
        .expect("collect body");
    assert!(body.is_empty());
}

#[test]
fn signature_gate_matches_the_platform_scheme() {
    let secret = "whsec_pipeline";
    let body = br#"{"id":42}"#;
    let sig = sign(secret, body);
    assert!(verify_signature(secret, body, &sig).is_ok());
    assert!(verify_signature(secret, br#"{"id":43}"#, &sig).is_err());
}
