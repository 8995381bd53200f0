//! Upload status tracking
//!
//! One row per bulk upload in `upload_jobs`, moving through
//! uploaded -> processing -> completed | failed. Transitions are guarded in
//! SQL so a stale worker can never move a record backwards, and every write
//! refreshes the retention window.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Lifecycle states for a bulk upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(UploadStatus::Uploaded),
            "processing" => Ok(UploadStatus::Processing),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(AppError::Internal(format!(
                "Unknown upload status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted upload record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UploadJobRecord {
    pub upload_id: Uuid,
    pub status: String,
    pub object_key: String,
    pub callback_url: Option<String>,
    pub rows_processed: i64,
    pub rows_failed: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl UploadJobRecord {
    pub fn status(&self) -> AppResult<UploadStatus> {
        self.status.parse()
    }
}

/// Status store backed by the `upload_jobs` table.
#[derive(Clone)]
pub struct StatusStore {
    pool: PgPool,
    retention_secs: i64,
}

impl StatusStore {
    pub fn new(pool: PgPool, retention_secs: u64) -> Self {
        Self {
            pool,
            retention_secs: retention_secs as i64,
        }
    }

    /// Register a new upload in the `uploaded` state.
    pub async fn create(
        &self,
        upload_id: Uuid,
        object_key: &str,
        callback_url: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_jobs (upload_id, status, object_key, callback_url, expires_at)
            VALUES ($1, $2, $3, $4, NOW() + ($5 * interval '1 second'))
            "#,
        )
        .bind(upload_id)
        .bind(UploadStatus::Uploaded.as_str())
        .bind(object_key)
        .bind(callback_url)
        .bind(self.retention_secs)
        .execute(&self.pool)
        .await?;

        debug!(%upload_id, "upload registered");
        Ok(())
    }

    /// Fetch an upload record. Rows past their retention window are treated
    /// as absent even if the sweeper has not deleted them yet.
    pub async fn get(&self, upload_id: Uuid) -> AppResult<Option<UploadJobRecord>> {
        let record = sqlx::query_as::<_, UploadJobRecord>(
            "SELECT * FROM upload_jobs WHERE upload_id = $1 AND expires_at > NOW()",
        )
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Move `uploaded` -> `processing`. Returns false if the record is in
    /// any other state, which callers surface as a conflict.
    pub async fn begin_processing(&self, upload_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = $2,
                started_at = NOW(),
                expires_at = NOW() + ($3 * interval '1 second')
            WHERE upload_id = $1 AND status = $4
            "#,
        )
        .bind(upload_id)
        .bind(UploadStatus::Processing.as_str())
        .bind(self.retention_secs)
        .bind(UploadStatus::Uploaded.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Move `processing` -> `completed` with final row counts.
    pub async fn complete(
        &self,
        upload_id: Uuid,
        rows_processed: u64,
        rows_failed: u64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = $2,
                rows_processed = $3,
                rows_failed = $4,
                completed_at = NOW(),
                expires_at = NOW() + ($5 * interval '1 second')
            WHERE upload_id = $1 AND status = $6
            "#,
        )
        .bind(upload_id)
        .bind(UploadStatus::Completed.as_str())
        .bind(rows_processed as i64)
        .bind(rows_failed as i64)
        .bind(self.retention_secs)
        .bind(UploadStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            info!(%upload_id, rows_processed, rows_failed, "upload completed");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Move `processing` -> `failed` with the failure reason. The staged
    /// file is kept so the upload can be re-processed.
    pub async fn fail(&self, upload_id: Uuid, error: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = $2,
                error = $3,
                completed_at = NOW(),
                expires_at = NOW() + ($4 * interval '1 second')
            WHERE upload_id = $1 AND status = $5
            "#,
        )
        .bind(upload_id)
        .bind(UploadStatus::Failed.as_str())
        .bind(error)
        .bind(self.retention_secs)
        .bind(UploadStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            info!(%upload_id, error, "upload failed");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Delete records past their retention window.
    pub async fn sweep_expired(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM upload_jobs WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!(deleted, "expired upload records removed");
        }
        Ok(deleted)
    }
}
