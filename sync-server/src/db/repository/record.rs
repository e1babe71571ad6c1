//! Target Record Repository
//!
//! Synchronized rows in the internal store. The `(mapping_id, external_id)`
//! pair is the idempotency key; `external_updated_at` is the last-write-wins
//! tie-break, so re-applying an old webhook or an overlapping incremental
//! page never rolls a record backwards.

use serde::{Deserialize, Serialize};
use shared::util::now_millis;
use surrealdb::Surreal;
use surrealdb::engine::local::Db;

use super::{BaseRepository, RepoError, RepoResult};

/// What an upsert did to the target row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Incoming data was older than the stored row, skipped
    Unchanged,
}

/// A synchronized row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub mapping_id: String,
    pub external_id: String,
    /// External platform's modification timestamp (millis)
    pub external_updated_at: i64,
    pub fields: serde_json::Value,
    pub synced_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordRow<'a> {
    mapping_id: &'a str,
    external_id: &'a str,
    external_updated_at: i64,
    fields: &'a serde_json::Value,
    synced_at: i64,
}

fn record_key(mapping_id: &str, external_id: &str) -> String {
    format!("{mapping_id}:{external_id}")
}

/// Single-statement upsert: the tie-break against the stored timestamp and
/// the write happen inside one block, so a concurrent writer (webhook job
/// vs sync run on the same mapping) can never roll a record back to an
/// older version between our read and our write.
const UPSERT_QUERY: &str = r#"{
    LET $target = type::thing('target_record', $key);
    LET $current = (SELECT VALUE externalUpdatedAt FROM ONLY $target);
    IF $current == NONE {
        UPSERT $target CONTENT $row;
        RETURN 'inserted';
    } ELSE IF $current > $row.externalUpdatedAt {
        RETURN 'unchanged';
    } ELSE {
        UPSERT $target CONTENT $row;
        RETURN 'updated';
    };
}"#;

const CLASSIFY_QUERY: &str = r#"{
    LET $current = (SELECT VALUE externalUpdatedAt FROM ONLY type::thing('target_record', $key));
    IF $current == NONE {
        RETURN 'inserted';
    } ELSE IF $current > $updated_at {
        RETURN 'unchanged';
    } ELSE {
        RETURN 'updated';
    };
}"#;

fn outcome_from_marker(marker: Option<String>) -> RepoResult<UpsertOutcome> {
    match marker.as_deref() {
        Some("inserted") => Ok(UpsertOutcome::Inserted),
        Some("updated") => Ok(UpsertOutcome::Updated),
        Some("unchanged") => Ok(UpsertOutcome::Unchanged),
        other => Err(RepoError::Database(format!(
            "Unexpected upsert reply: {other:?}"
        ))),
    }
}

#[derive(Clone)]
pub struct TargetRecordRepository {
    base: BaseRepository,
}

impl TargetRecordRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn get(
        &self,
        mapping_id: &str,
        external_id: &str,
    ) -> RepoResult<Option<TargetRecord>> {
        let mut result = self
            .base
            .db()
            .query("SELECT * OMIT id FROM type::thing('target_record', $key)")
            .bind(("key", record_key(mapping_id, external_id)))
            .await?;
        let records: Vec<TargetRecord> = result.take(0)?;
        Ok(records.into_iter().next())
    }

    /// Idempotent upsert keyed on `(mapping_id, external_id)`
    ///
    /// A stored row with a newer `external_updated_at` wins over the
    /// incoming data (at-least-once webhook delivery, overlap windows).
    /// The comparison and the write are one atomic statement.
    pub async fn upsert(
        &self,
        mapping_id: &str,
        external_id: &str,
        external_updated_at: i64,
        fields: &serde_json::Value,
    ) -> RepoResult<UpsertOutcome> {
        let row = RecordRow {
            mapping_id,
            external_id,
            external_updated_at,
            fields,
            synced_at: now_millis(),
        };
        let mut result = self
            .base
            .db()
            .query(UPSERT_QUERY)
            .bind(("key", record_key(mapping_id, external_id)))
            .bind(("row", serde_json::to_value(&row).map_err(|e| RepoError::Database(e.to_string()))?))
            .await?;
        outcome_from_marker(result.take(0)?)
    }

    /// Dry-run classification: what an upsert *would* do, without mutating
    pub async fn classify(
        &self,
        mapping_id: &str,
        external_id: &str,
        external_updated_at: i64,
    ) -> RepoResult<UpsertOutcome> {
        let mut result = self
            .base
            .db()
            .query(CLASSIFY_QUERY)
            .bind(("key", record_key(mapping_id, external_id)))
            .bind(("updated_at", external_updated_at))
            .await?;
        outcome_from_marker(result.take(0)?)
    }

    pub async fn delete(&self, mapping_id: &str, external_id: &str) -> RepoResult<bool> {
        if self.get(mapping_id, external_id).await?.is_none() {
            return Ok(false);
        }
        self.base
            .db()
            .query("DELETE type::thing('target_record', $key)")
            .bind(("key", record_key(mapping_id, external_id)))
            .await?;
        Ok(true)
    }

    /// External IDs currently stored for one mapping
    pub async fn external_ids(&self, mapping_id: &str) -> RepoResult<Vec<String>> {
        let mut result = self
            .base
            .db()
            .query("SELECT VALUE externalId FROM target_record WHERE mappingId = $mapping_id")
            .bind(("mapping_id", mapping_id.to_string()))
            .await?;
        let ids: Vec<String> = result.take(0)?;
        Ok(ids)
    }

    /// Delete rows whose external id is absent from `seen`. Full sync only.
    pub async fn delete_stale(&self, mapping_id: &str, seen: &[String]) -> RepoResult<u64> {
        let stored = self.external_ids(mapping_id).await?;
        let keep: std::collections::HashSet<&str> = seen.iter().map(String::as_str).collect();
        let mut deleted = 0u64;
        for external_id in stored {
            if !keep.contains(external_id.as_str()) && self.delete(mapping_id, &external_id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// How many stale rows a full sync *would* delete (dry run)
    pub async fn count_stale(&self, mapping_id: &str, seen: &[String]) -> RepoResult<u64> {
        let stored = self.external_ids(mapping_id).await?;
        let keep: std::collections::HashSet<&str> = seen.iter().map(String::as_str).collect();
        Ok(stored
            .iter()
            .filter(|id| !keep.contains(id.as_str()))
            .count() as u64)
    }

    pub async fn count_for_mapping(&self, mapping_id: &str) -> RepoResult<u64> {
        Ok(self.external_ids(mapping_id).await?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;

    async fn repo() -> TargetRecordRepository {
        let db = DbService::memory().await.expect("in-memory db");
        TargetRecordRepository::new(db.handle())
    }

    #[tokio::test]
    async fn upsert_classifies_and_keeps_the_newest_version() {
        let repo = repo().await;
        let v1 = serde_json::json!({"title": "A"});
        let v2 = serde_json::json!({"title": "B"});

        assert_eq!(
            repo.upsert("m1", "p1", 100, &v1).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            repo.upsert("m1", "p1", 200, &v2).await.unwrap(),
            UpsertOutcome::Updated
        );
        // A stale copy arriving late must not roll the row back
        assert_eq!(
            repo.upsert("m1", "p1", 150, &v1).await.unwrap(),
            UpsertOutcome::Unchanged
        );

        let stored = repo.get("m1", "p1").await.unwrap().expect("row");
        assert_eq!(stored.external_updated_at, 200);
        assert_eq!(stored.fields, v2);
    }

    #[tokio::test]
    async fn interleaved_writers_cannot_roll_a_record_back() {
        let repo = repo().await;

        // Two writers hammer one key, one always older than the other,
        // the way a webhook job and a sync run can overlap on a mapping
        let older = repo.clone();
        let newer = repo.clone();
        let a = tokio::spawn(async move {
            for i in 0..50 {
                older
                    .upsert("m1", "p1", 1_000 + i, &serde_json::json!({"v": "old"}))
                    .await
                    .unwrap();
            }
        });
        let b = tokio::spawn(async move {
            for i in 0..50 {
                newer
                    .upsert("m1", "p1", 2_000 + i, &serde_json::json!({"v": "new"}))
                    .await
                    .unwrap();
            }
        });
        a.await.unwrap();
        b.await.unwrap();

        let stored = repo.get("m1", "p1").await.unwrap().expect("row");
        assert_eq!(stored.external_updated_at, 2_049);
        assert_eq!(stored.fields, serde_json::json!({"v": "new"}));
    }

    #[tokio::test]
    async fn classify_reports_without_writing() {
        let repo = repo().await;
        let fields = serde_json::json!({"title": "A"});

        assert_eq!(
            repo.classify("m1", "p1", 100).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert!(repo.get("m1", "p1").await.unwrap().is_none());

        repo.upsert("m1", "p1", 100, &fields).await.unwrap();
        assert_eq!(
            repo.classify("m1", "p1", 50).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(
            repo.classify("m1", "p1", 150).await.unwrap(),
            UpsertOutcome::Updated
        );
    }
}
