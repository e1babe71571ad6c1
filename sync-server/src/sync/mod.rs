//! 同步引擎
//!
//! - [`SyncEngine`] - 全量/增量同步的编排
//! - [`RunningSyncRegistry`] - 单映射互斥（进程内 map + 分布式租约）
//! - [`transform`] - 字段级转换

pub mod engine;
pub mod registry;
pub mod transform;

pub use engine::{FullSyncRequest, IncrementalSyncRequest, SyncEngine, SyncOutcome};
pub use registry::{RunToken, RunningSyncRegistry};
