use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::status::{StatusStore, UploadJobRecord, UploadStatus};

#[derive(Debug, Clone)]
pub struct UploadStatusQuery {
    pub upload_id: Uuid,
}

/// Public view of an upload record. The callback URL stays private, and the
/// row counters appear only once processing has started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusResponse {
    pub upload_id: Uuid,
    pub status: UploadStatus,
    pub object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_processed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_failed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<UploadJobRecord> for UploadStatusResponse {
    type Error = AppError;

    fn try_from(record: UploadJobRecord) -> Result<Self, Self::Error> {
        let status = record.status()?;
        let populated = record.started_at.is_some();

        Ok(Self {
            upload_id: record.upload_id,
            status,
            object_key: record.object_key,
            rows_processed: populated.then_some(record.rows_processed),
            rows_failed: populated.then_some(record.rows_failed),
            error: record.error,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadStatusError {
    #[error("Upload not found")]
    NotFound,

    #[error("Status error: {0}")]
    Status(#[from] crate::error::AppError),
}

/// Fetch the status record. Expired records read as not found.
#[tracing::instrument(skip(status, query), fields(upload_id = %query.upload_id))]
pub async fn handle(
    status: StatusStore,
    query: UploadStatusQuery,
) -> Result<UploadStatusResponse, UploadStatusError> {
    let record = status
        .get(query.upload_id)
        .await?
        .ok_or(UploadStatusError::NotFound)?;

    Ok(record.try_into()?)
}
