//! Database integration tests against a disposable Postgres container.
//!
//! Coverage includes:
//! - Work queue: keyed enqueue dedup, claim locking, backoff scheduling,
//!   attempt exhaustion, stale-lock reclaim
//! - Upload status store: SQL-guarded monotonic transitions and retention
//! - COPY sink: abort leaves the table untouched, retry loads the full file
//! - Webhook delivery driven through the queue: fails twice, succeeds on the
//!   third attempt

use std::time::Duration;

use anyhow::Result;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

use inflow_server::idempotency::IdempotencyStore;
use inflow_server::models::{
    IngestJobData, WebhookCallbackPayload, WebhookJobData, JOB_TYPE_INGEST,
    JOB_TYPE_WEBHOOK_DELIVERY,
};
use inflow_server::notify::Notifier;
use inflow_server::pipeline::BulkCopySink;
use inflow_server::queue::{QueueJob, RetryPolicy, WorkQueue};
use inflow_server::status::{StatusStore, UploadStatus};
use inflow_server::worker::{EventProcessor, JobHandler, WebhookDeliverer};

const RETENTION_SECS: u64 = 3600;

/// Start a Postgres container and run the migrations. The container handle
/// must stay alive for the duration of the test.
async fn setup() -> Result<(ContainerAsync<Postgres>, PgPool)> {
    let container = Postgres::default().with_tag("16-alpine").start().await?;

    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let conn_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&conn_string)
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    Ok((container, pool))
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 50,
    }
}

async fn fetch_job(pool: &PgPool, id: &str) -> Result<QueueJob> {
    let job = sqlx::query_as::<_, QueueJob>("SELECT * FROM queue_jobs WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(job)
}

async fn make_job_due(pool: &PgPool, id: &str) -> Result<()> {
    sqlx::query("UPDATE queue_jobs SET run_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn event_count(pool: &PgPool, event_id: &str) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

// ============================================================================
// Work Queue Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn test_enqueue_is_idempotent_per_key() -> Result<()> {
    let (_container, pool) = setup().await?;
    let queue = WorkQueue::new(pool.clone());

    let first = queue
        .enqueue("job-1", "test-job", &serde_json::json!({"n": 1}), policy())
        .await?;
    let second = queue
        .enqueue("job-1", "test-job", &serde_json::json!({"n": 2}), policy())
        .await?;

    assert!(first);
    assert!(!second);

    // The original payload is untouched by the duplicate enqueue.
    let job = fetch_job(&pool, "job-1").await?;
    assert_eq!(job.payload["n"], 1);

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_claim_locks_job_and_increments_attempts() -> Result<()> {
    let (_container, pool) = setup().await?;
    let queue = WorkQueue::new(pool.clone());

    queue
        .enqueue("job-1", "test-job", &serde_json::json!({}), policy())
        .await?;

    let claimed = queue.claim("test-job", 10).await?;
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].attempts, 1);
    assert_eq!(claimed[0].status, "running");
    assert!(claimed[0].locked_at.is_some());

    // A running job cannot be claimed again.
    assert!(queue.claim("test-job", 10).await?.is_empty());

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_failed_attempt_is_rescheduled_with_backoff() -> Result<()> {
    let (_container, pool) = setup().await?;
    let queue = WorkQueue::new(pool.clone());

    queue
        .enqueue("job-1", "test-job", &serde_json::json!({}), policy())
        .await?;

    let job = queue.claim("test-job", 1).await?.remove(0);
    let retried = queue.retry_or_fail(&job, "boom").await?;
    assert!(retried);

    let rescheduled = fetch_job(&pool, "job-1").await?;
    assert_eq!(rescheduled.status, "pending");
    assert_eq!(rescheduled.last_error.as_deref(), Some("boom"));
    assert!(rescheduled.locked_at.is_none());
    assert!(rescheduled.run_at > chrono::Utc::now());

    // Not due yet, so a poll claims nothing.
    assert!(queue.claim("test-job", 1).await?.is_empty());

    // Once due, the next claim picks it up with the attempt counter advanced.
    make_job_due(&pool, "job-1").await?;
    let job = queue.claim("test-job", 1).await?.remove(0);
    assert_eq!(job.attempts, 2);

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_exhausted_job_is_parked_as_failed() -> Result<()> {
    let (_container, pool) = setup().await?;
    let queue = WorkQueue::new(pool.clone());

    let one_shot = RetryPolicy {
        max_attempts: 1,
        initial_backoff_ms: 50,
    };
    queue
        .enqueue("job-1", "test-job", &serde_json::json!({}), one_shot)
        .await?;

    let job = queue.claim("test-job", 1).await?.remove(0);
    let retried = queue.retry_or_fail(&job, "still broken").await?;
    assert!(!retried);

    // The job is retained for inspection, not deleted.
    let parked = fetch_job(&pool, "job-1").await?;
    assert_eq!(parked.status, "failed");
    assert_eq!(parked.last_error.as_deref(), Some("still broken"));

    // Failed jobs are never claimed again, even when due.
    make_job_due(&pool, "job-1").await?;
    assert!(queue.claim("test-job", 1).await?.is_empty());

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_stale_running_jobs_are_reclaimed() -> Result<()> {
    let (_container, pool) = setup().await?;
    let queue = WorkQueue::new(pool.clone());

    queue
        .enqueue("job-1", "test-job", &serde_json::json!({}), policy())
        .await?;
    queue.claim("test-job", 1).await?;

    // Simulate a consumer that died mid-flight.
    sqlx::query("UPDATE queue_jobs SET locked_at = NOW() - interval '10 minutes' WHERE id = $1")
        .bind("job-1")
        .execute(&pool)
        .await?;

    let reclaimed = queue.reclaim_stale(300).await?;
    assert_eq!(reclaimed, 1);

    // A fresh lock is not reclaimed.
    let job = queue.claim("test-job", 1).await?.remove(0);
    assert_eq!(job.attempts, 2);
    assert_eq!(queue.reclaim_stale(300).await?, 0);

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_completed_job_is_deleted() -> Result<()> {
    let (_container, pool) = setup().await?;
    let queue = WorkQueue::new(pool.clone());

    queue
        .enqueue("job-1", "test-job", &serde_json::json!({}), policy())
        .await?;
    let job = queue.claim("test-job", 1).await?.remove(0);
    queue.complete(&job.id).await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_jobs")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 0);

    Ok(())
}

// ============================================================================
// Status Store Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn test_upload_lifecycle_is_monotonic() -> Result<()> {
    let (_container, pool) = setup().await?;
    let status = StatusStore::new(pool, RETENTION_SECS);

    let upload_id = Uuid::new_v4();
    status.create(upload_id, "uploads/a.csv", None).await?;

    // Terminal transitions are rejected before processing starts.
    assert!(!status.complete(upload_id, 1, 0).await?);
    assert!(!status.fail(upload_id, "boom").await?);

    assert!(status.begin_processing(upload_id).await?);
    // Double-start is rejected; the guarded UPDATE only fires once.
    assert!(!status.begin_processing(upload_id).await?);

    assert!(status.complete(upload_id, 5, 1).await?);

    // The terminal transition happened exactly once; nothing moves after it.
    assert!(!status.complete(upload_id, 99, 0).await?);
    assert!(!status.fail(upload_id, "late failure").await?);
    assert!(!status.begin_processing(upload_id).await?);

    let record = status.get(upload_id).await?.unwrap();
    assert_eq!(record.status()?, UploadStatus::Completed);
    assert_eq!(record.rows_processed, 5);
    assert_eq!(record.rows_failed, 1);
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_failed_upload_keeps_error_and_stays_failed() -> Result<()> {
    let (_container, pool) = setup().await?;
    let status = StatusStore::new(pool, RETENTION_SECS);

    let upload_id = Uuid::new_v4();
    status
        .create(upload_id, "uploads/a.csv", Some("https://example.com/hook"))
        .await?;
    assert!(status.begin_processing(upload_id).await?);
    assert!(status.fail(upload_id, "missing header column").await?);

    // failed is terminal: no completion, no second failure.
    assert!(!status.complete(upload_id, 5, 0).await?);
    assert!(!status.fail(upload_id, "again").await?);

    let record = status.get(upload_id).await?.unwrap();
    assert_eq!(record.status()?, UploadStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("missing header column"));

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_expired_upload_reads_as_absent_and_is_swept() -> Result<()> {
    let (_container, pool) = setup().await?;
    let status = StatusStore::new(pool.clone(), 0);

    let upload_id = Uuid::new_v4();
    status.create(upload_id, "uploads/a.csv", None).await?;

    // Zero retention: the record is already past its window.
    assert!(status.get(upload_id).await?.is_none());

    let swept = status.sweep_expired().await?;
    assert_eq!(swept, 1);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM upload_jobs")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 0);

    Ok(())
}

// ============================================================================
// COPY Sink Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn test_aborted_copy_leaves_no_rows() -> Result<()> {
    let (_container, pool) = setup().await?;
    let sink = BulkCopySink::new(pool.clone());

    let mut session = sink.begin().await?;
    session
        .send(b"stripe,evt_1,2026-01-01T00:00:00Z,{}\n")
        .await?;
    session.abort("validation failed downstream").await?;

    assert_eq!(event_count(&pool, "evt_1").await?, 0);

    // A retry after the aborted load writes the full file, no partials.
    let mut session = sink.begin().await?;
    session
        .send(b"stripe,evt_1,2026-01-01T00:00:00Z,{}\n")
        .await?;
    session
        .send(b"github,evt_2,2026-01-02T00:00:00Z,{}\n")
        .await?;
    let written = session.finish().await?;

    assert_eq!(written, 2);
    assert_eq!(event_count(&pool, "evt_1").await?, 1);
    assert_eq!(event_count(&pool, "evt_2").await?, 1);

    Ok(())
}

// ============================================================================
// Event Processor Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn test_replayed_event_past_marker_ttl_stores_once() -> Result<()> {
    let (_container, pool) = setup().await?;

    let data = IngestJobData {
        provider: "stripe".to_string(),
        event_id: "evt_replay".to_string(),
        timestamp: chrono::Utc::now(),
        data: serde_json::json!({"amount": 100}),
    };
    let job = QueueJob {
        id: data.event_id.clone(),
        job_type: JOB_TYPE_INGEST.to_string(),
        payload: serde_json::to_value(&data)?,
        status: "running".to_string(),
        attempts: 1,
        max_attempts: 3,
        backoff_ms: 1000,
        run_at: chrono::Utc::now(),
        locked_at: Some(chrono::Utc::now()),
        last_error: None,
        created_at: chrono::Utc::now(),
    };

    // Fresh stores on each delivery model a replay after the marker expired;
    // the unique index is what keeps the table duplicate-free.
    for _ in 0..2 {
        let processor = EventProcessor::new(
            pool.clone(),
            IdempotencyStore::new(Duration::from_secs(60)),
            Notifier::new(),
        );
        processor.handle(&job).await?;
    }

    assert_eq!(event_count(&pool, "evt_replay").await?, 1);

    Ok(())
}

// ============================================================================
// Webhook Delivery Retry Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn test_delivery_fails_twice_then_succeeds_on_third_attempt() -> Result<()> {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let (_container, pool) = setup().await?;
    let queue = WorkQueue::new(pool.clone());
    let deliverer = WebhookDeliverer::new(Duration::from_secs(5))?;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let upload_id = Uuid::new_v4();
    let payload = WebhookJobData {
        upload_id,
        callback_url: format!("{}/hook", server.uri()),
        payload: WebhookCallbackPayload::completed(upload_id, 5, 0),
    };
    let key = format!("webhook-{}-completed", upload_id);
    queue
        .enqueue(&key, JOB_TYPE_WEBHOOK_DELIVERY, &payload, policy())
        .await?;

    // Drive the claim/handle/ack loop the worker runs, fast-forwarding the
    // backoff between attempts.
    let mut outcomes = Vec::new();
    for _ in 0..3 {
        make_job_due(&pool, &key).await?;
        let job = queue.claim(JOB_TYPE_WEBHOOK_DELIVERY, 1).await?.remove(0);
        match deliverer.handle(&job).await {
            Ok(()) => {
                queue.complete(&job.id).await?;
                outcomes.push(true);
            },
            Err(e) => {
                queue.retry_or_fail(&job, &e.to_string()).await?;
                outcomes.push(false);
            },
        }
    }

    assert_eq!(outcomes, vec![false, false, true]);

    // Delivered and acknowledged: nothing left in the queue.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_jobs")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 0);

    Ok(())
}
