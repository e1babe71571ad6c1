//! Shared Store Service
//!
//! Redis-backed cross-process coordination: the durable webhook queue,
//! schedule persistence and the distributed run leases. Optional: every
//! caller handles its absence explicitly.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use shared::models::{RunningSync, ScheduleConfig, WebhookJob};

use crate::utils::AppError;

const WEBHOOK_QUEUE_KEY: &str = "sync:webhook-jobs";
const SCHEDULES_KEY: &str = "sync:schedules";
const LEASE_PREFIX: &str = "sync:lease:";

/// Release only if the token still matches; a crashed-and-reclaimed lease
/// must not be deleted by its former holder. The stored value is JSON
/// `{"token": ..., "handle": ...}`.
const RELEASE_SCRIPT: &str = r#"
local v = redis.call('get', KEYS[1])
if not v then return 0 end
local ok, data = pcall(cjson.decode, v)
if ok and data['token'] == ARGV[1] then
    return redis.call('del', KEYS[1])
end
return 0
"#;

/// Rewrite the lease value while we still hold it, keeping the remaining
/// TTL. Used to record the history id once the run's history entry exists.
const UPDATE_SCRIPT: &str = r#"
local v = redis.call('get', KEYS[1])
if not v then return 0 end
local ok, data = pcall(cjson.decode, v)
if ok and data['token'] == ARGV[1] then
    local ttl = redis.call('pttl', KEYS[1])
    if ttl > 0 then
        redis.call('set', KEYS[1], ARGV[2], 'PX', ttl)
        return 1
    end
end
return 0
"#;

/// Renew only while we still hold the lease.
const RENEW_SCRIPT: &str = r#"
local v = redis.call('get', KEYS[1])
if not v then return 0 end
local ok, data = pcall(cjson.decode, v)
if ok and data['token'] == ARGV[1] then
    return redis.call('pexpire', KEYS[1], ARGV[2])
end
return 0
"#;

#[derive(Clone)]
pub struct SharedStoreService {
    manager: ConnectionManager,
}

impl std::fmt::Debug for SharedStoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStoreService").finish_non_exhaustive()
    }
}

impl SharedStoreService {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = Client::open(url)
            .map_err(|e| AppError::internal(format!("Failed to create Redis client: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::internal(format!("Failed to connect to Redis: {e}")))?;
        tracing::info!("Shared store connection established");
        Ok(Self { manager })
    }

    /// Connectivity probe used by health checks
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::internal(format!("Redis ping failed: {e}")))?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(AppError::internal(format!("Unexpected ping reply: {pong}")))
        }
    }

    // ========== Webhook queue ==========

    /// Persist a verified webhook job. Sub-second ack, processing decoupled.
    pub async fn enqueue_webhook(&self, job: &WebhookJob) -> Result<(), AppError> {
        let payload = serde_json::to_string(job)
            .map_err(|e| AppError::internal(format!("Failed to serialize webhook job: {e}")))?;
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .lpush(WEBHOOK_QUEUE_KEY, payload)
            .await
            .map_err(|e| AppError::internal(format!("Failed to enqueue webhook job: {e}")))?;
        Ok(())
    }

    /// Blocking pop (consumer side); returns `None` on timeout
    pub async fn pop_webhook(&self, timeout_secs: f64) -> Result<Option<WebhookJob>, AppError> {
        let mut conn = self.manager.clone();
        let popped: Option<(String, String)> = conn
            .brpop(WEBHOOK_QUEUE_KEY, timeout_secs)
            .await
            .map_err(|e| AppError::internal(format!("Failed to pop webhook job: {e}")))?;
        match popped {
            None => Ok(None),
            Some((_key, payload)) => {
                let job: WebhookJob = serde_json::from_str(&payload)
                    .map_err(|e| AppError::internal(format!("Corrupt webhook job: {e}")))?;
                Ok(Some(job))
            }
        }
    }

    // ========== Schedules ==========

    pub async fn put_schedule(&self, config: &ScheduleConfig) -> Result<(), AppError> {
        let payload = serde_json::to_string(config)
            .map_err(|e| AppError::internal(format!("Failed to serialize schedule: {e}")))?;
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .hset(SCHEDULES_KEY, &config.mapping_id, payload)
            .await
            .map_err(|e| AppError::internal(format!("Failed to store schedule: {e}")))?;
        Ok(())
    }

    pub async fn get_schedule(&self, mapping_id: &str) -> Result<Option<ScheduleConfig>, AppError> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = conn
            .hget(SCHEDULES_KEY, mapping_id)
            .await
            .map_err(|e| AppError::internal(format!("Failed to load schedule: {e}")))?;
        match payload {
            None => Ok(None),
            Some(payload) => {
                let config: ScheduleConfig = serde_json::from_str(&payload)
                    .map_err(|e| AppError::internal(format!("Corrupt schedule: {e}")))?;
                Ok(Some(config))
            }
        }
    }

    pub async fn remove_schedule(&self, mapping_id: &str) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn
            .hdel(SCHEDULES_KEY, mapping_id)
            .await
            .map_err(|e| AppError::internal(format!("Failed to remove schedule: {e}")))?;
        Ok(removed > 0)
    }

    pub async fn all_schedules(&self) -> Result<Vec<ScheduleConfig>, AppError> {
        let mut conn = self.manager.clone();
        let entries: std::collections::HashMap<String, String> = conn
            .hgetall(SCHEDULES_KEY)
            .await
            .map_err(|e| AppError::internal(format!("Failed to load schedules: {e}")))?;
        let mut configs = Vec::with_capacity(entries.len());
        for (mapping_id, payload) in entries {
            match serde_json::from_str::<ScheduleConfig>(&payload) {
                Ok(config) => configs.push(config),
                Err(e) => {
                    // Skip rather than fail the whole scheduler on one bad row
                    tracing::error!("Corrupt schedule for mapping {mapping_id}: {e}");
                }
            }
        }
        Ok(configs)
    }

    // ========== Run leases ==========

    /// Acquire the distributed run lease for one mapping (SET NX PX)
    ///
    /// The lease value is the serialized [`RunningSync`] handle so a
    /// conflicting instance can report what is running.
    pub async fn acquire_lease(
        &self,
        mapping_id: &str,
        token: &str,
        handle: &RunningSync,
        ttl_ms: u64,
    ) -> Result<bool, AppError> {
        let value = serde_json::json!({ "token": token, "handle": handle }).to_string();
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(format!("{LEASE_PREFIX}{mapping_id}"))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::internal(format!("Failed to acquire lease: {e}")))?;
        Ok(reply.is_some())
    }

    /// Read the current lease holder's handle, if any
    pub async fn lease_holder(&self, mapping_id: &str) -> Result<Option<RunningSync>, AppError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn
            .get(format!("{LEASE_PREFIX}{mapping_id}"))
            .await
            .map_err(|e| AppError::internal(format!("Failed to read lease: {e}")))?;
        Ok(value
            .and_then(|v| serde_json::from_str::<serde_json::Value>(&v).ok())
            .and_then(|v| serde_json::from_value(v.get("handle")?.clone()).ok()))
    }

    /// Replace the lease holder's handle (same token, TTL preserved)
    pub async fn update_lease_handle(
        &self,
        mapping_id: &str,
        token: &str,
        handle: &RunningSync,
    ) -> Result<bool, AppError> {
        let value = serde_json::json!({ "token": token, "handle": handle }).to_string();
        let mut conn = self.manager.clone();
        let updated: i64 = Script::new(UPDATE_SCRIPT)
            .key(format!("{LEASE_PREFIX}{mapping_id}"))
            .arg(token)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::internal(format!("Failed to update lease: {e}")))?;
        Ok(updated > 0)
    }

    /// Heartbeat: extend the lease while the run is still executing
    pub async fn renew_lease(
        &self,
        mapping_id: &str,
        token: &str,
        ttl_ms: u64,
    ) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();
        let renewed: i64 = Script::new(RENEW_SCRIPT)
            .key(format!("{LEASE_PREFIX}{mapping_id}"))
            .arg(token)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::internal(format!("Failed to renew lease: {e}")))?;
        Ok(renewed > 0)
    }

    /// Explicit release at run end; a crashed process's lease expires via TTL
    pub async fn release_lease(&self, mapping_id: &str, token: &str) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();
        let released: i64 = Script::new(RELEASE_SCRIPT)
            .key(format!("{LEASE_PREFIX}{mapping_id}"))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::internal(format!("Failed to release lease: {e}")))?;
        Ok(released > 0)
    }
}
