//! Database Module
//!
//! Embedded SurrealDB storage for mappings, sync history and synchronized
//! target records. Consumed by the engine through the repository layer only.

pub mod repository;

use crate::utils::AppError;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem, RocksDb};

/// Database service, owner of the embedded SurrealDB handle
#[derive(Clone, Debug)]
pub struct DbService {
    pub db: Surreal<Db>,
}

impl DbService {
    /// Open (or create) the on-disk database at `db_path`
    pub async fn new(db_path: &str) -> Result<Self, AppError> {
        let db: Surreal<Db> = Surreal::new::<RocksDb>(db_path)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;
        db.use_ns("wholesale")
            .use_db("sync")
            .await
            .map_err(|e| AppError::database(format!("Failed to select namespace: {e}")))?;

        tracing::info!("Database connection established ({db_path})");
        Ok(Self { db })
    }

    /// In-memory database for tests
    pub async fn memory() -> Result<Self, AppError> {
        let db: Surreal<Db> = Surreal::new::<Mem>(())
            .await
            .map_err(|e| AppError::database(format!("Failed to open in-memory db: {e}")))?;
        db.use_ns("wholesale")
            .use_db("sync")
            .await
            .map_err(|e| AppError::database(format!("Failed to select namespace: {e}")))?;
        Ok(Self { db })
    }

    /// Connectivity probe used by health checks
    pub async fn test_connection(&self) -> Result<(), AppError> {
        self.db
            .query("RETURN 1")
            .await
            .map_err(|e| AppError::database(format!("Database probe failed: {e}")))?;
        Ok(())
    }

    pub fn handle(&self) -> Surreal<Db> {
        self.db.clone()
    }
}
