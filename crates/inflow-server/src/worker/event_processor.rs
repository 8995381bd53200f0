//! Single-event ingestion consumer
//!
//! Persists one externally-sourced event per job and broadcasts a
//! completion notification. The idempotency store short-circuits recently
//! seen ids; the unique index on `event_id` is the final barrier, so a
//! duplicate slipping past an expired marker is logged, acknowledged, and
//! produces no second row.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::idempotency::IdempotencyStore;
use crate::models::{EventRecord, IngestJobData, JobCompletedEvent, JOB_TYPE_INGEST};
use crate::notify::Notifier;
use crate::queue::QueueJob;
use crate::worker::JobHandler;

pub struct EventProcessor {
    pool: PgPool,
    idempotency: IdempotencyStore,
    notifier: Notifier,
}

impl EventProcessor {
    pub fn new(pool: PgPool, idempotency: IdempotencyStore, notifier: Notifier) -> Self {
        Self {
            pool,
            idempotency,
            notifier,
        }
    }
}

#[async_trait]
impl JobHandler for EventProcessor {
    fn job_type(&self) -> &'static str {
        JOB_TYPE_INGEST
    }

    async fn handle(&self, job: &QueueJob) -> anyhow::Result<()> {
        let started = std::time::Instant::now();
        let data: IngestJobData = job.payload_as()?;

        if self.idempotency.is_processed(&data.event_id).await {
            warn!(
                event_id = %data.event_id,
                provider = %data.provider,
                "duplicate event skipped"
            );
            return Ok(());
        }

        let stored = sqlx::query_as::<_, EventRecord>(
            r#"
            INSERT INTO webhook_events (provider, event_id, timestamp, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&data.provider)
        .bind(&data.event_id)
        .bind(data.timestamp)
        .bind(&data.data)
        .fetch_optional(&self.pool)
        .await?;

        match stored {
            Some(event) => info!(
                event_id = %event.event_id,
                provider = %event.provider,
                row_id = event.id,
                "event stored"
            ),
            None => debug!(
                event_id = %data.event_id,
                "event already stored, acknowledging duplicate"
            ),
        }

        self.idempotency.mark_processed(&data.event_id).await;

        self.notifier.job_completed(JobCompletedEvent {
            job_id: job.id.clone(),
            event_id: data.event_id,
            provider: data.provider,
            processing_time: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        Ok(())
    }
}
