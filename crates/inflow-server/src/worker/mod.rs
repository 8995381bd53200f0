//! Queue consumers
//!
//! A [`Worker`] polls the durable queue for one job type and dispatches
//! claimed jobs to its [`JobHandler`]. Handler errors feed the retry policy;
//! the worker itself never gives up on the loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::queue::{QueueJob, WorkQueue};

pub mod event_processor;
pub mod webhook_delivery;

pub use event_processor::EventProcessor;
pub use webhook_delivery::WebhookDeliverer;

/// Processes one kind of queue job.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Queue job type this handler consumes.
    fn job_type(&self) -> &'static str;

    /// Process one claimed job. An error triggers retry-or-fail.
    async fn handle(&self, job: &QueueJob) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Jobs claimed and processed per poll.
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Lock age after which a running job is considered abandoned.
    pub reclaim_after: Duration,
}

/// Poll loop binding one handler to the queue.
pub struct Worker {
    queue: WorkQueue,
    handler: Arc<dyn JobHandler>,
    options: WorkerOptions,
}

impl Worker {
    pub fn new(queue: WorkQueue, handler: Arc<dyn JobHandler>, options: WorkerOptions) -> Self {
        Self {
            queue,
            handler,
            options,
        }
    }

    /// Run until the shutdown signal flips. In-flight jobs finish before the
    /// loop exits; unfinished claims are eventually reclaimed by lock age.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let job_type = self.handler.job_type();
        info!(
            job_type,
            concurrency = self.options.concurrency,
            "worker started"
        );

        let mut poll = tokio::time::interval(self.options.poll_interval);
        let mut reclaim = tokio::time::interval(self.options.reclaim_after);
        // First tick of an interval fires immediately; skip the reclaim one
        // so a fresh deployment does not steal jobs from live workers.
        reclaim.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(job_type, "worker shutting down");
                    break;
                },
                _ = reclaim.tick() => {
                    if let Err(e) = self.queue.reclaim_stale(self.options.reclaim_after.as_secs()).await {
                        error!(job_type, "failed to reclaim stale jobs: {}", e);
                    }
                },
                _ = poll.tick() => {
                    self.drain_due().await;
                },
            }
        }
    }

    async fn drain_due(&self) {
        let job_type = self.handler.job_type();

        let jobs = match self.queue.claim(job_type, self.options.concurrency as i64).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(job_type, "failed to claim jobs: {}", e);
                return;
            },
        };

        if jobs.is_empty() {
            return;
        }

        debug!(job_type, claimed = jobs.len(), "processing claimed jobs");
        futures::future::join_all(jobs.iter().map(|job| self.process(job))).await;
    }

    async fn process(&self, job: &QueueJob) {
        match self.handler.handle(job).await {
            Ok(()) => {
                if let Err(e) = self.queue.complete(&job.id).await {
                    error!(job_id = %job.id, "failed to complete job: {}", e);
                }
            },
            Err(e) => {
                let message = e.to_string();
                debug!(job_id = %job.id, attempt = job.attempts, "job failed: {}", message);
                if let Err(e) = self.queue.retry_or_fail(job, &message).await {
                    error!(job_id = %job.id, "failed to reschedule job: {}", e);
                }
            },
        }
    }
}
