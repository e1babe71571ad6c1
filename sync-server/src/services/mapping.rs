//! Mapping Service
//!
//! 同步映射的 CRUD。引擎和 Webhook 处理器只读映射，写入只来自运营 API。

use shared::models::mapping::{SyncMapping, SyncMappingCreate, SyncMappingUpdate};
use shared::models::SourceEntity;

use crate::db::DbService;
use crate::db::repository::MappingRepository;
use crate::utils::{AppError, AppResult};

#[derive(Clone)]
pub struct MappingService {
    repo: MappingRepository,
}

impl MappingService {
    pub fn new(db: &DbService) -> Self {
        Self {
            repo: MappingRepository::new(db.handle()),
        }
    }

    pub async fn get_all(&self) -> AppResult<Vec<SyncMapping>> {
        Ok(self.repo.find_all().await?)
    }

    pub async fn get_by_id(&self, id: &str) -> AppResult<Option<SyncMapping>> {
        Ok(self.repo.find_by_id(id).await?)
    }

    /// Mappings that accept webhooks for a given source entity
    pub async fn webhook_targets(&self, entity: SourceEntity) -> AppResult<Vec<SyncMapping>> {
        let all = self.repo.find_all().await?;
        Ok(all
            .into_iter()
            .filter(|m| m.webhook_enabled && m.source_entity == entity)
            .collect())
    }

    pub async fn create(&self, data: SyncMappingCreate) -> AppResult<SyncMapping> {
        Ok(self.repo.create(data).await?)
    }

    pub async fn update(&self, id: &str, data: SyncMappingUpdate) -> AppResult<SyncMapping> {
        Ok(self.repo.update(id, data).await?)
    }

    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.repo.delete(id).await?)
    }

    /// Fetch a mapping or fail with the caller-visible NOT_FOUND
    pub async fn require(&self, id: &str) -> AppResult<SyncMapping> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Mapping {id} not found")))
    }
}
