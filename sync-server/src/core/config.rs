//! 服务器配置
//!
//! # 环境变量
//!
//! | 环境变量 | 默认值 | 说明 |
//! |----------|--------|------|
//! | HTTP_PORT | 3000 | HTTP 服务端口 |
//! | WORK_DIR | /var/lib/wholesale/sync | 工作目录（数据库、日志） |
//! | ENVIRONMENT | development | 运行环境 |
//! | DATABASE_PATH | (无) | 内部存储路径，未设置时数据库能力缺席 |
//! | PLATFORM_API_URL | (无) | 外部平台 GraphQL 端点 |
//! | PLATFORM_ACCESS_TOKEN | (无) | 外部平台访问令牌 |
//! | PLATFORM_WEBHOOK_SECRET | (无) | Webhook 签名密钥 |
//! | REDIS_URL | (无) | 共享存储连接串，未设置时队列/调度降级 |
//! | PLATFORM_PAGE_SIZE | 100 | 每页拉取记录数 |
//! | SYNC_LOOKBACK_MINUTES | 15 | 增量同步回看窗口（分钟） |
//! | SYNC_MAX_RUN_ERRORS | 20 | 单次运行记录的错误上限 |
//! | SYNC_LEASE_TTL_MS | 60000 | 分布式运行租约 TTL（毫秒） |

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 同步服务的所有配置项
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 工作目录
    pub work_dir: String,
    /// 运行环境: development | staging | production
    pub environment: String,

    // === 可缺席的连接配置 ===
    /// 内部存储路径 (None = 数据库未配置)
    pub database_path: Option<String>,
    /// 外部平台 API 地址
    pub platform_api_url: Option<String>,
    /// 外部平台访问令牌
    pub platform_access_token: Option<String>,
    /// Webhook 签名密钥
    pub webhook_secret: Option<String>,
    /// 共享存储 (Redis) 连接串
    pub redis_url: Option<String>,

    // === 同步行为调优 ===
    /// 每页拉取记录数
    pub platform_page_size: u32,
    /// 增量同步默认回看窗口（分钟）
    pub default_lookback_minutes: u32,
    /// 单次运行记录的错误上限
    pub max_run_errors: usize,
    /// 分布式运行租约 TTL（毫秒）
    pub lease_ttl_ms: u64,
}

impl Config {
    /// 从环境变量加载配置，未设置时使用默认值
    pub fn from_env() -> Self {
        Self {
            http_port: env_parsed("HTTP_PORT", 3000),
            work_dir: std::env::var("WORK_DIR")
                .unwrap_or_else(|_| "/var/lib/wholesale/sync".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            database_path: env_opt("DATABASE_PATH"),
            platform_api_url: env_opt("PLATFORM_API_URL"),
            platform_access_token: env_opt("PLATFORM_ACCESS_TOKEN"),
            webhook_secret: env_opt("PLATFORM_WEBHOOK_SECRET"),
            redis_url: env_opt("REDIS_URL"),

            platform_page_size: env_parsed("PLATFORM_PAGE_SIZE", 100),
            default_lookback_minutes: env_parsed("SYNC_LOOKBACK_MINUTES", 15),
            max_run_errors: env_parsed("SYNC_MAX_RUN_ERRORS", 20),
            lease_ttl_ms: env_parsed("SYNC_LEASE_TTL_MS", 60_000),
        }
    }

}
