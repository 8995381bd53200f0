use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{IngestJobData, JOB_TYPE_INGEST};
use crate::queue::{RetryPolicy, WorkQueue};

#[derive(Debug, Clone)]
pub struct IngestWebhookCommand {
    pub provider: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestWebhookResponse {
    pub accepted: bool,
    pub job_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestWebhookError {
    #[error("Provider is required and cannot be empty")]
    ProviderRequired,

    #[error("eventId is required and must be a non-empty string")]
    EventIdRequired,

    #[error("timestamp is required and must be an ISO 8601 datetime")]
    TimestampInvalid,

    #[error("data is required and must be a non-empty object")]
    DataInvalid,

    #[error("Queue error: {0}")]
    Queue(#[from] crate::error::AppError),
}

impl IngestWebhookCommand {
    /// Validate the request body and build the queue payload.
    pub fn validate(&self) -> Result<IngestJobData, IngestWebhookError> {
        if self.provider.trim().is_empty() {
            return Err(IngestWebhookError::ProviderRequired);
        }

        let event_id = self
            .body
            .get("eventId")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or(IngestWebhookError::EventIdRequired)?;

        let timestamp = self
            .body
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or(IngestWebhookError::TimestampInvalid)?;

        let data = self
            .body
            .get("data")
            .and_then(|v| v.as_object())
            .filter(|o| !o.is_empty())
            .ok_or(IngestWebhookError::DataInvalid)?;

        Ok(IngestJobData {
            provider: self.provider.clone(),
            event_id: event_id.to_string(),
            timestamp,
            data: serde_json::Value::Object(data.clone()),
        })
    }
}

/// Validate and enqueue one event. The job is keyed by event id, so a
/// repeated submission acknowledges without creating a second job.
#[tracing::instrument(skip(queue, command), fields(provider = %command.provider))]
pub async fn handle(
    queue: WorkQueue,
    retry: RetryPolicy,
    command: IngestWebhookCommand,
) -> Result<IngestWebhookResponse, IngestWebhookError> {
    let job = command.validate()?;
    let job_id = job.event_id.clone();

    let enqueued = queue.enqueue(&job_id, JOB_TYPE_INGEST, &job, retry).await?;
    if !enqueued {
        tracing::debug!(event_id = %job_id, "event already queued, acknowledging");
    }

    Ok(IngestWebhookResponse {
        accepted: true,
        job_id,
    })
}
