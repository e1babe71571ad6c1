//! Webhook Processor
//!
//! 消费已验证的 webhook 任务，把变更应用到启用了 webhook 的映射上。
//! 平台可能重复投递同一事件，应用以载荷自身的 id/updated_at 为准
//! （last-write-wins），重复处理不会重复计数或破坏目标数据。

use std::time::Instant;

use serde::Serialize;
use shared::models::{
    SourceEntity, SyncMapping, SyncRunError, SyncRunStatus, SyncStats, SyncType, WebhookJob,
};
use tracing::{info, warn};

use crate::db::DbService;
use crate::db::repository::{TargetRecordRepository, UpsertOutcome};
use crate::services::{MappingService, SyncHistoryService};
use crate::sync::transform::apply_transforms;
use crate::utils::AppResult;

/// What one webhook topic asks the processor to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WebhookAction {
    Upsert,
    Delete,
}

/// Outcome of processing one job, returned to the caller (inline mode)
/// or logged by the queue consumer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub success: bool,
    pub records_written: u64,
    pub processing_ms: i64,
}

#[derive(Clone)]
pub struct WebhookProcessor {
    mappings: MappingService,
    history: SyncHistoryService,
    records: TargetRecordRepository,
}

impl WebhookProcessor {
    pub fn new(db: &DbService) -> Self {
        Self {
            mappings: MappingService::new(db),
            history: SyncHistoryService::new(db),
            records: TargetRecordRepository::new(db.handle()),
        }
    }

    /// Apply one verified job to every mapping that subscribes to its entity
    ///
    /// Per-mapping failures are recorded in that mapping's history entry and
    /// do not stop the remaining mappings. Internal platform detail stays in
    /// the server log.
    pub async fn process(&self, job: &WebhookJob) -> AppResult<WebhookOutcome> {
        let started = Instant::now();

        let Some((entity, action)) = parse_topic(&job.topic) else {
            warn!(topic = %job.topic, shop = %job.shop_domain, "Unhandled webhook topic, ignoring");
            return Ok(WebhookOutcome {
                success: true,
                records_written: 0,
                processing_ms: started.elapsed().as_millis() as i64,
            });
        };

        let Some(external_id) = external_id(entity, &job.payload) else {
            warn!(topic = %job.topic, "Webhook payload carries no record id, ignoring");
            return Ok(WebhookOutcome {
                success: false,
                records_written: 0,
                processing_ms: started.elapsed().as_millis() as i64,
            });
        };
        let updated_at = payload_updated_at(&job.payload).unwrap_or(job.received_at);

        let targets = self.mappings.webhook_targets(entity).await?;
        if targets.is_empty() {
            info!(topic = %job.topic, "No webhook-enabled mapping for entity, nothing to do");
            return Ok(WebhookOutcome {
                success: true,
                records_written: 0,
                processing_ms: started.elapsed().as_millis() as i64,
            });
        }

        let mut written = 0u64;
        let mut all_ok = true;
        for mapping in &targets {
            match self
                .apply_to_mapping(mapping, action, &external_id, updated_at, job)
                .await
            {
                Ok(count) => written += count,
                Err(e) => {
                    all_ok = false;
                    warn!(
                        mapping_id = %mapping.id,
                        topic = %job.topic,
                        error = %e,
                        "Webhook application failed for mapping"
                    );
                }
            }
        }

        let processing_ms = started.elapsed().as_millis() as i64;
        info!(
            topic = %job.topic,
            records_written = written,
            processing_ms,
            "Webhook job processed"
        );
        Ok(WebhookOutcome {
            success: all_ok,
            records_written: written,
            processing_ms,
        })
    }

    /// One mapping, one history entry. The entry is finalized on every path
    /// so a processor crash between create and finalize is the only way to
    /// leave a running row behind.
    async fn apply_to_mapping(
        &self,
        mapping: &SyncMapping,
        action: WebhookAction,
        external_id: &str,
        updated_at: i64,
        job: &WebhookJob,
    ) -> AppResult<u64> {
        let entry = self
            .history
            .start_run(&mapping.id, &mapping.name, SyncType::Incremental, "webhook")
            .await?;

        let result = self
            .apply_record(mapping, action, external_id, updated_at, &job.payload)
            .await;

        let (status, stats, errors, written) = match &result {
            Ok(outcome) => {
                let mut stats = SyncStats::default();
                let written = match (action, outcome) {
                    (WebhookAction::Upsert, Some(UpsertOutcome::Inserted)) => {
                        stats.inserted = 1;
                        1
                    }
                    (WebhookAction::Upsert, Some(UpsertOutcome::Updated)) => {
                        stats.updated = 1;
                        1
                    }
                    (WebhookAction::Delete, Some(_)) => {
                        stats.deleted = 1;
                        1
                    }
                    // stale redelivery, or delete of an already-absent record
                    _ => 0,
                };
                (SyncRunStatus::Completed, stats, Vec::new(), written)
            }
            Err(e) => {
                let mut stats = SyncStats::default();
                stats.errors_count = 1;
                let errors = vec![SyncRunError {
                    record_id: Some(external_id.to_string()),
                    message: e.to_string(),
                }];
                (SyncRunStatus::Failed, stats, errors, 0)
            }
        };

        if let Err(e) = self
            .history
            .finish_run(entry.id, status, stats, errors)
            .await
        {
            warn!(history_id = entry.id, error = %e, "Failed to finalize webhook history entry");
        }

        result.map(|_| written)
    }

    async fn apply_record(
        &self,
        mapping: &SyncMapping,
        action: WebhookAction,
        external_id: &str,
        updated_at: i64,
        payload: &serde_json::Value,
    ) -> AppResult<Option<UpsertOutcome>> {
        match action {
            WebhookAction::Delete => {
                let removed = self.records.delete(&mapping.id, external_id).await?;
                Ok(removed.then_some(UpsertOutcome::Updated))
            }
            WebhookAction::Upsert => {
                let fields = apply_transforms(&mapping.transforms, payload)
                    .map_err(|e| crate::utils::AppError::validation(e.to_string()))?;
                let outcome = self
                    .records
                    .upsert(&mapping.id, external_id, updated_at, &fields)
                    .await?;
                Ok(Some(outcome))
            }
        }
    }
}

/// Map a platform topic onto an entity and an action
fn parse_topic(topic: &str) -> Option<(SourceEntity, WebhookAction)> {
    match topic {
        "products/create" | "products/update" => Some((SourceEntity::Products, WebhookAction::Upsert)),
        "products/delete" => Some((SourceEntity::Products, WebhookAction::Delete)),
        "inventory_levels/update" | "inventory_items/update" => {
            Some((SourceEntity::Inventory, WebhookAction::Upsert))
        }
        "inventory_items/delete" => Some((SourceEntity::Inventory, WebhookAction::Delete)),
        _ => None,
    }
}

/// The payload's own record identity (numeric or string id)
fn external_id(entity: SourceEntity, payload: &serde_json::Value) -> Option<String> {
    let key = match entity {
        SourceEntity::Products => "id",
        SourceEntity::Inventory => "inventory_item_id",
    };
    match payload.get(key) {
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => payload.get("id").and_then(|v| match v {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }),
    }
}

/// `updated_at` from the payload (RFC 3339), the last-write-wins tie-break
fn payload_updated_at(payload: &serde_json::Value) -> Option<i64> {
    payload
        .get("updated_at")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topics_map_to_entity_and_action() {
        assert_eq!(
            parse_topic("products/update"),
            Some((SourceEntity::Products, WebhookAction::Upsert))
        );
        assert_eq!(
            parse_topic("products/delete"),
            Some((SourceEntity::Products, WebhookAction::Delete))
        );
        assert_eq!(
            parse_topic("inventory_levels/update"),
            Some((SourceEntity::Inventory, WebhookAction::Upsert))
        );
        assert_eq!(parse_topic("orders/create"), None);
    }

    #[test]
    fn external_id_prefers_entity_key() {
        let inv = json!({ "inventory_item_id": 808950810, "available": 6 });
        assert_eq!(
            external_id(SourceEntity::Inventory, &inv),
            Some("808950810".to_string())
        );

        let product = json!({ "id": "gid://platform/Product/42" });
        assert_eq!(
            external_id(SourceEntity::Products, &product),
            Some("gid://platform/Product/42".to_string())
        );

        assert_eq!(external_id(SourceEntity::Products, &json!({})), None);
    }

    #[test]
    fn payload_updated_at_parses_rfc3339() {
        let payload = json!({ "updated_at": "2026-01-15T10:30:00Z" });
        assert_eq!(payload_updated_at(&payload), Some(1_768_473_000_000));
        assert_eq!(payload_updated_at(&json!({})), None);
        assert_eq!(payload_updated_at(&json!({ "updated_at": "later" })), None);
    }
}
