//! Mapping Repository

use serde::Serialize;
use shared::models::mapping::{SyncMapping, SyncMappingCreate, SyncMappingUpdate};
use shared::util::now_millis;
use surrealdb::Surreal;
use surrealdb::engine::local::Db;
use uuid::Uuid;

use super::{BaseRepository, RepoError, RepoResult};

const TABLE: &str = "sync_mapping";

/// Stored row; the record key carries the mapping id
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MappingRow<'a> {
    name: &'a str,
    source_entity: shared::models::SourceEntity,
    target_table: &'a str,
    transforms: &'a [shared::models::FieldTransform],
    webhook_enabled: bool,
    created_at: i64,
    updated_at: i64,
}

#[derive(Clone)]
pub struct MappingRepository {
    base: BaseRepository,
}

impl MappingRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// All mappings ordered by name
    pub async fn find_all(&self) -> RepoResult<Vec<SyncMapping>> {
        let mappings: Vec<SyncMapping> = self
            .base
            .db()
            .query("SELECT *, record::id(id) AS id FROM sync_mapping ORDER BY name")
            .await?
            .take(0)?;
        Ok(mappings)
    }

    pub async fn find_by_id(&self, id: &str) -> RepoResult<Option<SyncMapping>> {
        let mut result = self
            .base
            .db()
            .query("SELECT *, record::id(id) AS id FROM sync_mapping WHERE record::id(id) = $id LIMIT 1")
            .bind(("id", id.to_string()))
            .await?;
        let mappings: Vec<SyncMapping> = result.take(0)?;
        Ok(mappings.into_iter().next())
    }

    pub async fn find_by_name(&self, name: &str) -> RepoResult<Option<SyncMapping>> {
        let mut result = self
            .base
            .db()
            .query("SELECT *, record::id(id) AS id FROM sync_mapping WHERE name = $name LIMIT 1")
            .bind(("name", name.to_string()))
            .await?;
        let mappings: Vec<SyncMapping> = result.take(0)?;
        Ok(mappings.into_iter().next())
    }

    /// Create a new mapping with a generated stable id
    pub async fn create(&self, data: SyncMappingCreate) -> RepoResult<SyncMapping> {
        if data.name.trim().is_empty() {
            return Err(RepoError::Validation("Mapping name is required".into()));
        }
        if data.target_table.trim().is_empty() {
            return Err(RepoError::Validation("Target table is required".into()));
        }
        // Check duplicate name
        if self.find_by_name(&data.name).await?.is_some() {
            return Err(RepoError::Duplicate(format!(
                "Mapping '{}' already exists",
                data.name
            )));
        }

        let id = Uuid::new_v4().to_string();
        let now = now_millis();
        let row = MappingRow {
            name: &data.name,
            source_entity: data.source_entity,
            target_table: &data.target_table,
            transforms: &data.transforms,
            webhook_enabled: data.webhook_enabled,
            created_at: now,
            updated_at: now,
        };
        let _created: Option<serde_json::Value> = self
            .base
            .db()
            .create((TABLE, id.as_str()))
            .content(serde_json::to_value(&row).map_err(|e| RepoError::Database(e.to_string()))?)
            .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| RepoError::Database("Mapping vanished after create".into()))
    }

    /// Update mutable configuration; identity fields are untouched
    pub async fn update(&self, id: &str, data: SyncMappingUpdate) -> RepoResult<SyncMapping> {
        let existing = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("Mapping {id} not found")))?;

        let name = data.name.unwrap_or(existing.name);
        let target_table = data.target_table.unwrap_or(existing.target_table);
        let transforms = data.transforms.unwrap_or(existing.transforms);
        let webhook_enabled = data.webhook_enabled.unwrap_or(existing.webhook_enabled);

        self.base
            .db()
            .query(
                "UPDATE type::thing('sync_mapping', $id) MERGE {
                    name: $name,
                    targetTable: $target_table,
                    transforms: $transforms,
                    webhookEnabled: $webhook_enabled,
                    updatedAt: $updated_at
                }",
            )
            .bind(("id", id.to_string()))
            .bind(("name", name))
            .bind(("target_table", target_table))
            .bind(("transforms", transforms))
            .bind(("webhook_enabled", webhook_enabled))
            .bind(("updated_at", now_millis()))
            .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::Database("Mapping vanished after update".into()))
    }

    pub async fn delete(&self, id: &str) -> RepoResult<bool> {
        if self.find_by_id(id).await?.is_none() {
            return Ok(false);
        }
        self.base
            .db()
            .query("DELETE type::thing('sync_mapping', $id)")
            .bind(("id", id.to_string()))
            .await?;
        Ok(true)
    }
}
