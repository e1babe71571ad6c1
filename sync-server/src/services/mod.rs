//! 服务层
//!
//! - [`ConfigService`] - 连接配置加载（两半均可缺席）
//! - [`SharedStoreService`] - Redis 共享存储（队列/调度/租约）
//! - [`MappingService`] - 同步映射 CRUD
//! - [`SyncHistoryService`] - 同步历史查询与写入
//! - [`SchedulerService`] - cron 调度（依赖共享存储）

pub mod config;
pub mod history;
pub mod mapping;
pub mod scheduler;
pub mod shared_store;

pub use config::{ConfigService, Connections, DatabaseSettings, PlatformSettings, RedisSettings};
pub use history::SyncHistoryService;
pub use mapping::MappingService;
pub use scheduler::{ScheduleStatus, SchedulerService};
pub use shared_store::SharedStoreService;
