//! 服务器状态
//!
//! ServerState 持有所有服务的共享引用，使用 Arc 实现浅拷贝。
//! 三个连接能力（数据库 / 外部平台 / 共享存储）都可以缺席：
//! 缺席时依赖它的组件不会被构建，对应的 API 返回 NOT_CONFIGURED
//! 或 REDIS_NOT_CONFIGURED，而不是在启动时失败。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connectors::{HttpPlatformConnector, PlatformSource};
use crate::core::Config;
use crate::db::DbService;
use crate::services::{
    ConfigService, MappingService, SchedulerService, SharedStoreService, SyncHistoryService,
};
use crate::sync::SyncEngine;
use crate::sync::registry::RunningSyncRegistry;
use crate::utils::{AppError, AppResult};
use crate::webhooks::{WebhookConsumer, WebhookProcessor, WebhookQueue};

/// 服务器状态 - 服务单例的容器
///
/// | 字段 | 依赖 | 缺席时 |
/// |------|------|--------|
/// | db | DATABASE_PATH | 映射/历史/webhook API 返回 NOT_CONFIGURED |
/// | platform | PLATFORM_API_URL + TOKEN | 同步运行返回 NOT_CONFIGURED |
/// | store | REDIS_URL | 队列内联处理，调度 REDIS_NOT_CONFIGURED |
/// | engine | db + platform | 同步运行返回 NOT_CONFIGURED |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub db: Option<DbService>,
    pub store: Option<SharedStoreService>,
    pub platform: Option<Arc<dyn PlatformSource>>,
    pub engine: Option<Arc<SyncEngine>>,
    pub queue: Option<WebhookQueue>,
    pub scheduler: Option<Arc<SchedulerService>>,
    pub registry: Arc<RunningSyncRegistry>,
    /// 后台任务的关闭信号
    pub shutdown: CancellationToken,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 连接配置解析（每一半都可缺席）
    /// 2. 嵌入式数据库 + 连通性检查
    /// 3. 共享存储（配置了但连不上视为启动错误）
    /// 4. 外部平台连接器
    /// 5. 同步引擎、webhook 管道、调度器（按依赖可用性构建）
    pub async fn initialize(config: &Config) -> AppResult<Self> {
        let connections = ConfigService::new(config.clone()).load();

        let db = match &connections.database {
            Some(settings) => {
                let service = DbService::new(&settings.path).await?;
                service.test_connection().await?;
                info!(path = %settings.path, "Database connected");
                Some(service)
            }
            None => {
                warn!("DATABASE_PATH not set, running without the internal store");
                None
            }
        };

        let store = match &connections.redis {
            Some(settings) => {
                let store = SharedStoreService::connect(&settings.url).await?;
                store.ping().await?;
                info!("Shared store connected");
                Some(store)
            }
            None => {
                warn!("REDIS_URL not set, webhook queue and scheduler are degraded");
                None
            }
        };

        let platform: Option<Arc<dyn PlatformSource>> = match &connections.platform {
            Some(settings) => {
                let connector = HttpPlatformConnector::new(
                    settings.api_url.clone(),
                    settings.access_token.clone(),
                    settings.page_size,
                )?;
                Some(Arc::new(connector))
            }
            None => {
                warn!("Platform credentials not set, sync runs are unavailable");
                None
            }
        };

        let registry = Arc::new(RunningSyncRegistry::new(
            store.clone(),
            config.lease_ttl_ms,
        ));

        let engine = match (&db, &platform) {
            (Some(db), Some(platform)) => Some(Arc::new(SyncEngine::new(
                Arc::clone(platform),
                MappingService::new(db),
                SyncHistoryService::new(db),
                crate::db::repository::TargetRecordRepository::new(db.handle()),
                Arc::clone(&registry),
                config.max_run_errors,
                config.default_lookback_minutes,
            ))),
            _ => None,
        };

        let queue = db
            .as_ref()
            .map(|db| WebhookQueue::new(store.clone(), WebhookProcessor::new(db)));

        let scheduler = match (&store, &engine, &db) {
            (Some(store), Some(engine), Some(db)) => Some(Arc::new(
                SchedulerService::new(
                    store.clone(),
                    Arc::clone(engine),
                    SyncHistoryService::new(db),
                )
                .await?,
            )),
            _ => None,
        };

        Ok(Self {
            config: config.clone(),
            db,
            store,
            platform,
            engine,
            queue,
            scheduler,
            registry,
            shutdown: CancellationToken::new(),
        })
    }

    /// 启动后台任务（webhook 消费者、调度器）
    ///
    /// 必须在 `Server::run()` 之前调用。
    pub async fn start_background_tasks(&self) -> AppResult<()> {
        if let (Some(store), Some(db)) = (&self.store, &self.db) {
            let consumer = WebhookConsumer::new(
                store.clone(),
                WebhookProcessor::new(db),
                self.shutdown.clone(),
            );
            tokio::spawn(consumer.run());
        }

        if let Some(scheduler) = &self.scheduler {
            scheduler.start().await?;
        }

        Ok(())
    }

    /// 进程退出前的清理
    pub async fn shutdown_background_tasks(&self) {
        self.shutdown.cancel();
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown().await;
        }
    }

    // === 能力访问器：缺席时返回带错误码的 AppError ===

    pub fn require_db(&self) -> AppResult<&DbService> {
        self.db
            .as_ref()
            .ok_or_else(|| AppError::not_configured("Database is not configured"))
    }

    pub fn require_engine(&self) -> AppResult<&Arc<SyncEngine>> {
        self.engine.as_ref().ok_or_else(|| {
            AppError::not_configured("Sync engine requires both database and platform connections")
        })
    }

    pub fn require_queue(&self) -> AppResult<&WebhookQueue> {
        self.queue
            .as_ref()
            .ok_or_else(|| AppError::not_configured("Webhook processing requires the database"))
    }

    pub fn require_scheduler(&self) -> AppResult<&Arc<SchedulerService>> {
        self.scheduler.as_ref().ok_or_else(|| {
            AppError::RedisNotConfigured(
                "Scheduling requires the shared store (REDIS_URL)".to_string(),
            )
        })
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.config.webhook_secret.as_deref()
    }
}
