//! Wholesale Sync Server - 目录/库存同步引擎
//!
//! # 架构概述
//!
//! 本模块是同步服务的主入口，提供以下核心功能：
//!
//! - **同步引擎** (`sync`): 全量/增量同步，单映射互斥
//! - **Webhook 管道** (`webhooks`): 签名验证、持久化队列、幂等处理
//! - **调度器** (`services/scheduler`): 基于共享存储的 cron 调度
//! - **数据库** (`db`): 嵌入式 SurrealDB 存储和仓储层
//! - **连接器** (`connectors`): 外部电商平台客户端
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! sync-server/src/
//! ├── core/          # 配置、状态、错误、服务器
//! ├── utils/         # 错误响应、日志
//! ├── db/            # 数据库层（仓储模式）
//! ├── connectors/    # 外部平台连接器
//! ├── services/      # 配置、映射、历史、共享存储、调度
//! ├── sync/          # 同步引擎和运行注册表
//! ├── webhooks/      # Webhook 验证/队列/处理
//! └── api/           # HTTP 路由和处理器
//! ```

pub mod api;
pub mod connectors;
pub mod core;
pub mod db;
pub mod services;
pub mod sync;
pub mod utils;
pub mod webhooks;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use sync::{SyncEngine, SyncOutcome};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
 _       ____          __                __
| |     / / /_  ____  / /__  _________ _/ /__
| | /| / / __ \/ __ \/ / _ \/ ___/ __ `/ / _ \
| |/ |/ / / / / /_/ / /  __(__  ) /_/ / /  __/
|__/|__/_/ /_/\____/_/\___/____/\__,_/_/\___/
   _____
  / ___/__  ______  _____
  \__ \/ / / / __ \/ ___/
 ___/ / /_/ / / / / /__
/____/\__, /_/ /_/\___/
     /____/
    "#
    );
}

/// 设置运行环境 (dotenv + 日志)
pub fn setup_environment() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional, env vars win either way
    let _ = dotenv::dotenv();

    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    init_logger_with_file(log_level.as_deref(), None, log_dir.as_deref());

    Ok(())
}
