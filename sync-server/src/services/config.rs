//! Config Service
//!
//! Loads connection configuration for the internal store, the external
//! platform and the shared store. Every half may be absent; dependent
//! components treat "not configured" as a first-class state rather than
//! an error at load time.

use crate::core::Config;

/// Internal store settings
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub path: String,
}

/// External platform settings
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub api_url: String,
    pub access_token: String,
    pub page_size: u32,
}

/// Shared store (Redis) settings
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
}

/// Loaded connection configuration, all halves optional
#[derive(Debug, Clone, Default)]
pub struct Connections {
    pub database: Option<DatabaseSettings>,
    pub platform: Option<PlatformSettings>,
    pub redis: Option<RedisSettings>,
}

#[derive(Debug, Clone)]
pub struct ConfigService {
    config: Config,
}

impl ConfigService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Resolve the optional connection halves from the loaded config
    ///
    /// A half-configured platform (URL without token or vice versa) counts
    /// as not configured and is warned about once at startup.
    pub fn load(&self) -> Connections {
        let database = self
            .config
            .database_path
            .as_ref()
            .map(|path| DatabaseSettings { path: path.clone() });

        let platform = match (
            self.config.platform_api_url.as_ref(),
            self.config.platform_access_token.as_ref(),
        ) {
            (Some(api_url), Some(access_token)) => Some(PlatformSettings {
                api_url: api_url.clone(),
                access_token: access_token.clone(),
                page_size: self.config.platform_page_size,
            }),
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "Platform connection is half-configured (need both PLATFORM_API_URL and PLATFORM_ACCESS_TOKEN), treating as not configured"
                );
                None
            }
            (None, None) => None,
        };

        let redis = self
            .config
            .redis_url
            .as_ref()
            .map(|url| RedisSettings { url: url.clone() });

        Connections {
            database,
            platform,
            redis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            http_port: 3000,
            work_dir: "/tmp/sync-test".into(),
            environment: "development".into(),
            database_path: None,
            platform_api_url: None,
            platform_access_token: None,
            webhook_secret: None,
            redis_url: None,
            platform_page_size: 100,
            default_lookback_minutes: 15,
            max_run_errors: 20,
            lease_ttl_ms: 60_000,
        }
    }

    #[test]
    fn empty_config_loads_as_nothing_configured() {
        let conns = ConfigService::new(base_config()).load();
        assert!(conns.database.is_none());
        assert!(conns.platform.is_none());
        assert!(conns.redis.is_none());
    }

    #[test]
    fn half_configured_platform_is_not_configured() {
        let mut config = base_config();
        config.platform_api_url = Some("https://shop.example.com/admin/api".into());
        let conns = ConfigService::new(config).load();
        assert!(conns.platform.is_none());
    }

    #[test]
    fn fully_configured_platform_loads() {
        let mut config = base_config();
        config.platform_api_url = Some("https://shop.example.com/admin/api".into());
        config.platform_access_token = Some("token".into());
        let conns = ConfigService::new(config).load();
        assert!(conns.platform.is_some());
    }
}
