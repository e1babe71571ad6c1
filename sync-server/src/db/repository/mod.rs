//! Repository Module
//!
//! Provides CRUD operations for SurrealDB tables.
//!
//! ## ID convention
//!
//! Record keys are the business IDs (mapping id, history id, or the
//! `mapping:external` pair for target records). Queries project the key
//! back into the payload with `record::id(id) AS id`, so model structs
//! never carry SurrealDB `Thing` values.

pub mod history;
pub mod mapping;
pub mod record;

pub use history::HistoryRepository;
pub use mapping::MappingRepository;
pub use record::{TargetRecord, TargetRecordRepository, UpsertOutcome};

use surrealdb::Surreal;
use surrealdb::engine::local::Db;
use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<surrealdb::Error> for RepoError {
    fn from(err: surrealdb::Error) -> Self {
        RepoError::Database(err.to_string())
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Base repository with database reference
#[derive(Clone)]
pub struct BaseRepository {
    db: Surreal<Db>,
}

impl BaseRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Surreal<Db> {
        &self.db
    }
}
