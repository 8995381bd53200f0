//! Outbound webhook delivery consumer
//!
//! POSTs the terminal upload status to the user's callback URL. Any
//! connection error, timeout, or non-2xx response counts as a failed
//! attempt and is handed back to the queue's retry policy. Delivery is
//! at-least-once; receivers are expected to deduplicate by upload id.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::models::{WebhookJobData, JOB_TYPE_WEBHOOK_DELIVERY};
use crate::queue::QueueJob;
use crate::worker::JobHandler;

pub struct WebhookDeliverer {
    client: reqwest::Client,
}

impl WebhookDeliverer {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("inflow-webhook/1.0")
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl JobHandler for WebhookDeliverer {
    fn job_type(&self) -> &'static str {
        JOB_TYPE_WEBHOOK_DELIVERY
    }

    async fn handle(&self, job: &QueueJob) -> anyhow::Result<()> {
        let data: WebhookJobData = job.payload_as()?;

        let response = self
            .client
            .post(&data.callback_url)
            .json(&data.payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "Callback for upload {} returned {}",
                data.upload_id,
                status
            );
        }

        info!(
            upload_id = %data.upload_id,
            callback_url = %data.callback_url,
            attempt = job.attempts,
            "webhook delivered"
        );
        Ok(())
    }
}
