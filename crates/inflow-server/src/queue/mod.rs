//! Postgres-backed work queue
//!
//! Jobs live in the `queue_jobs` table and are claimed with
//! `FOR UPDATE SKIP LOCKED`, so any number of consumers can poll the same
//! job type without double-claiming. Enqueueing is keyed: the job id is the
//! primary key and conflicts are dropped, which gives exactly one pending
//! job per key. Completed jobs are deleted; exhausted jobs are kept in the
//! `failed` state for inspection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::error::AppResult;

/// Retry policy applied per job at enqueue time.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub initial_backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay before the next attempt, doubling per completed attempt.
    /// Attempt 1 failing waits the initial backoff, attempt 2 twice that.
    pub fn backoff_ms(&self, attempts: i32) -> u64 {
        let exponent = attempts.saturating_sub(1).max(0) as u32;
        self.initial_backoff_ms.saturating_mul(1u64 << exponent.min(20))
    }
}

/// One row of `queue_jobs`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueJob {
    pub id: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_ms: i64,
    pub run_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueueJob {
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Handle to the durable queue.
#[derive(Clone)]
pub struct WorkQueue {
    pool: PgPool,
}

impl WorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a job keyed by `id`. Returns false when a job with the same
    /// key already exists, leaving the existing job untouched.
    pub async fn enqueue<T: Serialize>(
        &self,
        id: &str,
        job_type: &str,
        payload: &T,
        policy: RetryPolicy,
    ) -> AppResult<bool> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| crate::error::AppError::Internal(format!("Payload encoding: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO queue_jobs (id, job_type, payload, max_attempts, backoff_ms)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(job_type)
        .bind(&payload)
        .bind(policy.max_attempts)
        .bind(policy.initial_backoff_ms as i64)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        if inserted {
            debug!(job_id = id, job_type, "job enqueued");
        } else {
            debug!(job_id = id, job_type, "duplicate job key, enqueue skipped");
        }
        Ok(inserted)
    }

    /// Claim up to `limit` due jobs of one type. Claimed jobs move to
    /// `running` with the attempt counter already incremented.
    pub async fn claim(&self, job_type: &str, limit: i64) -> AppResult<Vec<QueueJob>> {
        let jobs = sqlx::query_as::<_, QueueJob>(
            r#"
            UPDATE queue_jobs
            SET status = 'running', locked_at = NOW(), attempts = attempts + 1
            WHERE id IN (
                SELECT id FROM queue_jobs
                WHERE job_type = $1 AND status = 'pending' AND run_at <= NOW()
                ORDER BY run_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(job_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    /// Delete a finished job.
    pub async fn complete(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM queue_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!(job_id = id, "job completed");
        Ok(())
    }

    /// Reschedule a failed attempt with exponential backoff, or park the job
    /// as `failed` once its attempts are exhausted. Returns true if another
    /// attempt was scheduled.
    pub async fn retry_or_fail(&self, job: &QueueJob, error: &str) -> AppResult<bool> {
        if job.attempts >= job.max_attempts {
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET status = 'failed', locked_at = NULL, last_error = $2
                WHERE id = $1
                "#,
            )
            .bind(&job.id)
            .bind(error)
            .execute(&self.pool)
            .await?;

            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                attempts = job.attempts,
                error,
                "job attempts exhausted"
            );
            return Ok(false);
        }

        let policy = RetryPolicy {
            max_attempts: job.max_attempts,
            initial_backoff_ms: job.backoff_ms as u64,
        };
        let delay_ms = policy.backoff_ms(job.attempts) as i64;

        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'pending',
                locked_at = NULL,
                last_error = $2,
                run_at = NOW() + ($3 * interval '1 millisecond')
            WHERE id = $1
            "#,
        )
        .bind(&job.id)
        .bind(error)
        .bind(delay_ms)
        .execute(&self.pool)
        .await?;

        debug!(
            job_id = %job.id,
            attempt = job.attempts,
            delay_ms,
            "job rescheduled"
        );
        Ok(true)
    }

    /// Return jobs stuck in `running` past the lock age back to `pending`.
    /// Covers workers that crashed between claim and completion.
    pub async fn reclaim_stale(&self, older_than_secs: u64) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'pending', locked_at = NULL
            WHERE status = 'running'
              AND locked_at IS NOT NULL
              AND locked_at < NOW() - ($1 * interval '1 second')
            "#,
        )
        .bind(older_than_secs as i64)
        .execute(&self.pool)
        .await?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            warn!(reclaimed, "stale jobs returned to pending");
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1000,
        };
        assert_eq!(policy.backoff_ms(1), 1000);
        assert_eq!(policy.backoff_ms(2), 2000);
        assert_eq!(policy.backoff_ms(3), 4000);
    }

    #[test]
    fn test_backoff_handles_zero_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 500,
        };
        assert_eq!(policy.backoff_ms(0), 500);
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_attempts: 100,
            initial_backoff_ms: u64::MAX / 2,
        };
        assert_eq!(policy.backoff_ms(64), u64::MAX);
    }
}
