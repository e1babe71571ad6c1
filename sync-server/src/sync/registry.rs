//! Running Sync Registry
//!
//! 单映射互斥的执行者。进程内用 DashMap 原子 check-and-set；配置了共享
//! 存储时再叠加一层分布式租约（TTL + 心跳续约 + 显式释放），崩溃的进程
//! 不会把映射永久锁死。

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::models::{RunningSync, SyncType};
use shared::util::now_millis;
use uuid::Uuid;

use crate::services::SharedStoreService;
use crate::utils::AppError;

/// Proof of a successfully acquired run slot
///
/// Returned by [`RunningSyncRegistry::try_acquire`]. The happy path hands it
/// back to [`RunningSyncRegistry::release`], which also drops the distributed
/// lease immediately. If the run unwinds instead (a panic anywhere between
/// acquire and release), the token's `Drop` stops the heartbeat and frees the
/// in-process slot, and the lease lapses via its TTL. Either way the mapping
/// is never locked out permanently.
#[derive(Debug)]
pub struct RunToken {
    pub mapping_id: String,
    lease_token: Option<String>,
    heartbeat: Option<tokio::task::JoinHandle<()>>,
    registry: Weak<RunningSyncRegistry>,
    released: bool,
}

impl Drop for RunToken {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.running.remove(&self.mapping_id);
            tracing::warn!(
                "Run for mapping {} ended without an explicit release, slot reclaimed",
                self.mapping_id
            );
        }
    }
}

pub struct RunningSyncRegistry {
    running: DashMap<String, RunningSync>,
    store: Option<SharedStoreService>,
    lease_ttl_ms: u64,
}

impl RunningSyncRegistry {
    pub fn new(store: Option<SharedStoreService>, lease_ttl_ms: u64) -> Self {
        Self {
            running: DashMap::new(),
            store,
            lease_ttl_ms,
        }
    }

    /// Atomic check-and-set: accept the run or fail fast with the
    /// conflicting run's type. Conflicts are rejected, never queued.
    pub async fn try_acquire(
        self: &Arc<Self>,
        mapping_id: &str,
        sync_type: SyncType,
    ) -> Result<RunToken, AppError> {
        let handle = RunningSync {
            mapping_id: mapping_id.to_string(),
            sync_type,
            started_at: now_millis(),
            history_id: 0,
        };

        // In-process exclusivity first; the DashMap entry API makes the
        // check-and-insert a single atomic step.
        match self.running.entry(mapping_id.to_string()) {
            Entry::Occupied(existing) => {
                return Err(AppError::SyncAlreadyRunning {
                    mapping_id: mapping_id.to_string(),
                    sync_type: existing.get().sync_type,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
            }
        }

        // Cross-process exclusivity when the shared store is available
        let mut lease_token = None;
        let mut heartbeat = None;
        if let Some(store) = &self.store {
            let token = Uuid::new_v4().to_string();
            let acquired = match store
                .acquire_lease(mapping_id, &token, &handle, self.lease_ttl_ms)
                .await
            {
                Ok(acquired) => acquired,
                Err(e) => {
                    self.running.remove(mapping_id);
                    return Err(e);
                }
            };
            if !acquired {
                self.running.remove(mapping_id);
                let holder_type = store
                    .lease_holder(mapping_id)
                    .await
                    .ok()
                    .flatten()
                    .map(|h| h.sync_type)
                    .unwrap_or(sync_type);
                return Err(AppError::SyncAlreadyRunning {
                    mapping_id: mapping_id.to_string(),
                    sync_type: holder_type,
                });
            }

            heartbeat = Some(self.spawn_heartbeat(mapping_id.to_string(), token.clone()));
            lease_token = Some(token);
        }

        Ok(RunToken {
            mapping_id: mapping_id.to_string(),
            lease_token,
            heartbeat,
            registry: Arc::downgrade(self),
            released: false,
        })
    }

    fn spawn_heartbeat(
        self: &Arc<Self>,
        mapping_id: String,
        token: String,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let interval = std::time::Duration::from_millis(registry.lease_ttl_ms / 3);
            loop {
                tokio::time::sleep(interval).await;
                let Some(store) = &registry.store else { break };
                match store
                    .renew_lease(&mapping_id, &token, registry.lease_ttl_ms)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        // Lease was reclaimed; another instance may start a
                        // run; this one keeps going to its terminal state.
                        tracing::warn!("Run lease for mapping {mapping_id} was lost during renewal");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Run lease renewal failed for mapping {mapping_id}: {e}");
                    }
                }
            }
        })
    }

    /// Record the history id once the run's history entry exists
    ///
    /// Mirrored into the distributed lease value so a conflicting instance
    /// reports the real history id rather than a placeholder.
    pub async fn attach_history(&self, token: &RunToken, history_id: i64) {
        let handle = match self.running.get_mut(&token.mapping_id) {
            Some(mut entry) => {
                entry.history_id = history_id;
                entry.clone()
            }
            None => return,
        };
        if let (Some(store), Some(lease_token)) = (&self.store, &token.lease_token)
            && let Err(e) = store
                .update_lease_handle(&token.mapping_id, lease_token, &handle)
                .await
        {
            tracing::warn!(
                "Failed to record history id in run lease for {}: {e}",
                token.mapping_id
            );
        }
    }

    /// Remove the handle and release the lease. Explicit happy-path exit;
    /// an unwound run relies on the token's `Drop` plus lease TTL instead.
    pub async fn release(&self, mut token: RunToken) {
        token.released = true;
        if let Some(heartbeat) = token.heartbeat.take() {
            heartbeat.abort();
        }
        if let (Some(store), Some(lease_token)) = (&self.store, token.lease_token.take())
            && let Err(e) = store.release_lease(&token.mapping_id, &lease_token).await
        {
            // TTL expiry will reclaim it
            tracing::warn!("Failed to release run lease for {}: {e}", token.mapping_id);
        }
        self.running.remove(&token.mapping_id);
    }

    pub fn get(&self, mapping_id: &str) -> Option<RunningSync> {
        self.running.get(mapping_id).map(|e| e.clone())
    }

    pub fn list(&self) -> Vec<RunningSync> {
        self.running.iter().map(|e| e.value().clone()).collect()
    }
}
