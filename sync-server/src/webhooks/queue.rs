//! Webhook Queue
//!
//! 摄入与处理解耦：有共享存储时任务入队并立刻确认（亚秒级 ack），
//! 由后台消费者逐个处理；没有共享存储时在请求内同步处理，
//! 降级但行为正确。

use serde::Serialize;
use shared::models::WebhookJob;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::services::SharedStoreService;
use crate::utils::AppResult;
use crate::webhooks::processor::{WebhookOutcome, WebhookProcessor};

/// How long one `BRPOP` waits before the consumer loop re-checks shutdown
const POP_TIMEOUT_SECS: f64 = 5.0;

/// Total processing attempts for one durable job. The ingestion endpoint
/// already acked 200 at enqueue time, so the platform will not redeliver;
/// past this cap the next scheduled sync's lookback window is the backstop.
const MAX_ATTEMPTS: u32 = 3;

/// The next attempt of a failed durable job, or `None` once the cap is hit
fn retry(job: &WebhookJob) -> Option<WebhookJob> {
    (job.attempts + 1 < MAX_ATTEMPTS).then(|| {
        let mut next = job.clone();
        next.attempts += 1;
        next
    })
}

/// What the ingestion endpoint reports back to the platform
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WebhookSubmission {
    /// Durable store available: persisted, will be processed shortly
    Queued { queued: bool },
    /// No durable store: processed inline within the request
    Processed(WebhookOutcome),
}

#[derive(Clone)]
pub struct WebhookQueue {
    store: Option<SharedStoreService>,
    processor: WebhookProcessor,
}

impl WebhookQueue {
    pub fn new(store: Option<SharedStoreService>, processor: WebhookProcessor) -> Self {
        Self { store, processor }
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_some()
    }

    /// Accept a verified job
    ///
    /// With a shared store the job is persisted and the call returns without
    /// touching the platform or the target records. Without one the job is
    /// processed inline and the outcome returned synchronously.
    pub async fn submit(&self, job: WebhookJob) -> AppResult<WebhookSubmission> {
        match &self.store {
            Some(store) => {
                store.enqueue_webhook(&job).await?;
                info!(job_id = job.id, topic = %job.topic, "Webhook job queued");
                Ok(WebhookSubmission::Queued { queued: true })
            }
            None => {
                let outcome = self.processor.process(&job).await?;
                Ok(WebhookSubmission::Processed(outcome))
            }
        }
    }
}

/// Background consumer draining the durable queue
///
/// Started only when a shared store is configured. A job that fails
/// processing is pushed back up to [`MAX_ATTEMPTS`]; processing is
/// idempotent so the extra attempts are harmless.
pub struct WebhookConsumer {
    store: SharedStoreService,
    processor: WebhookProcessor,
    shutdown: CancellationToken,
}

impl WebhookConsumer {
    pub fn new(
        store: SharedStoreService,
        processor: WebhookProcessor,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            processor,
            shutdown,
        }
    }

    pub async fn run(self) {
        info!("Webhook consumer started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Webhook consumer shutting down");
                    break;
                }
                popped = self.store.pop_webhook(POP_TIMEOUT_SECS) => {
                    match popped {
                        Ok(Some(job)) => self.handle(job).await,
                        Ok(None) => {} // timeout, loop back to re-check shutdown
                        Err(e) => {
                            error!(error = %e, "Webhook queue pop failed, backing off");
                            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, job: shared::models::WebhookJob) {
        let job_id = job.id;
        match self.processor.process(&job).await {
            Ok(outcome) if outcome.success => {}
            Ok(outcome) => {
                warn!(
                    job_id,
                    records_written = outcome.records_written,
                    "Webhook job finished with failed mappings"
                );
            }
            Err(e) => {
                error!(job_id, error = %e, "Webhook job processing failed");
                match retry(&job) {
                    Some(next) => {
                        if let Err(e) = self.store.enqueue_webhook(&next).await {
                            error!(job_id, error = %e, "Failed to re-queue webhook job");
                        }
                    }
                    None => {
                        warn!(
                            job_id,
                            "Webhook job dropped after {MAX_ATTEMPTS} attempts, \
                             the next scheduled sync will pick the change up"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_jobs_requeue_until_the_attempt_cap() {
        let first = WebhookJob::new(
            "products/update",
            "demo.myplatform.com",
            serde_json::json!({"id": 1}),
        );
        assert_eq!(first.attempts, 0);

        let second = retry(&first).expect("first re-queue");
        assert_eq!(second.attempts, 1);
        let third = retry(&second).expect("second re-queue");
        assert_eq!(third.attempts, 2);

        // Third failure exhausts the cap
        assert!(retry(&third).is_none());
    }
}
