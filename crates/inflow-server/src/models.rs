//! Shared data model
//!
//! Wire payloads for the work queue, the outbound callback, and the live
//! notification channel, plus the persisted event record. Wire DTOs are
//! camelCase to match the external contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::UploadStatus;

/// Job type for single-event ingestion jobs.
pub const JOB_TYPE_INGEST: &str = "webhook-ingest";

/// Job type for outbound webhook delivery jobs.
pub const JOB_TYPE_WEBHOOK_DELIVERY: &str = "webhook-delivery";

/// Name of the broadcast event emitted when a single event finishes processing.
pub const EVENT_JOB_COMPLETED: &str = "job-completed";

/// Queue payload for one externally-sourced event.
///
/// `event_id` doubles as the queue job key, so enqueueing the same event
/// twice cannot create a duplicate pending job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJobData {
    pub provider: String,
    pub event_id: String,
    /// Timestamp supplied by the origin system, not server-received time.
    pub timestamp: DateTime<Utc>,
    /// Opaque structured document; never modeled beyond "non-empty object".
    pub data: serde_json::Value,
}

/// Event record as persisted in `webhook_events`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub provider: String,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Queue payload for one outbound webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookJobData {
    pub upload_id: Uuid,
    pub callback_url: String,
    pub payload: WebhookCallbackPayload,
}

/// JSON body POSTed to the user's callback URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCallbackPayload {
    pub upload_id: Uuid,
    /// Terminal upload status: completed or failed.
    pub status: UploadStatus,
    pub rows_processed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_failed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WebhookCallbackPayload {
    /// Payload for a successfully completed upload.
    pub fn completed(upload_id: Uuid, rows_processed: u64, rows_failed: u64) -> Self {
        Self {
            upload_id,
            status: UploadStatus::Completed,
            rows_processed,
            rows_failed: Some(rows_failed),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Payload for a failed upload.
    pub fn failed(upload_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            upload_id,
            status: UploadStatus::Failed,
            rows_processed: 0,
            rows_failed: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast message emitted after a single event is durably processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletedEvent {
    pub job_id: String,
    pub event_id: String,
    pub provider: String,
    /// Milliseconds from queue-dequeue to notification.
    pub processing_time: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_job_data_uses_camel_case() {
        let job = IngestJobData {
            provider: "stripe".to_string(),
            event_id: "evt_1".to_string(),
            timestamp: Utc::now(),
            data: serde_json::json!({"amount": 100}),
        };

        let value = serde_json::to_value(&job).unwrap();
        assert!(value.get("eventId").is_some());
        assert!(value.get("event_id").is_none());
    }

    #[test]
    fn test_completed_payload_shape() {
        let upload_id = Uuid::new_v4();
        let payload = WebhookCallbackPayload::completed(upload_id, 98, 2);

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["rowsProcessed"], 98);
        assert_eq!(value["rowsFailed"], 2);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failed_payload_omits_rows_failed() {
        let payload = WebhookCallbackPayload::failed(Uuid::new_v4(), "sink unreachable");

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "sink unreachable");
        assert!(value.get("rowsFailed").is_none());
    }

    #[test]
    fn test_payload_status_carries_lifecycle_enum() {
        let completed = WebhookCallbackPayload::completed(Uuid::new_v4(), 1, 0);
        assert_eq!(completed.status, UploadStatus::Completed);

        let failed = WebhookCallbackPayload::failed(Uuid::new_v4(), "boom");
        assert_eq!(failed.status, UploadStatus::Failed);
        assert_eq!(failed.status.to_string(), "failed");
    }

    #[test]
    fn test_job_completed_event_round_trip() {
        let event = JobCompletedEvent {
            job_id: "evt_1".to_string(),
            event_id: "evt_1".to_string(),
            provider: "stripe".to_string(),
            processing_time: 42,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("processingTime"));
        let back: JobCompletedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_id, "evt_1");
        assert_eq!(back.processing_time, 42);
    }
}
