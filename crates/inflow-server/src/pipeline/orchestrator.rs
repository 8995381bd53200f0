//! Bulk-load orchestration
//!
//! Drives one upload through the full load: status transition, storage
//! read, the three transform stages, and the COPY session. On success the
//! source object is deleted; on failure it is kept so the client can retry,
//! and the atomic COPY guarantees no partial rows were written either way.
//! Terminal bookkeeping failures are logged, never re-thrown, so the
//! pipeline result always reflects the load itself.

use anyhow::anyhow;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{WebhookCallbackPayload, WebhookJobData, JOB_TYPE_WEBHOOK_DELIVERY};
use crate::pipeline::format::format_row;
use crate::pipeline::parse::CsvParser;
use crate::pipeline::validate::{RowStats, RowValidator};
use crate::pipeline::{BulkCopySink, ValidatedRow, STAGE_BUFFER};
use crate::queue::{RetryPolicy, WorkQueue};
use crate::status::StatusStore;
use crate::storage::Storage;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Upload {0} not found")]
    NotFound(Uuid),

    #[error("Upload {0} is not in the uploaded state")]
    NotProcessable(Uuid),

    #[error("{message}")]
    Pipeline { upload_id: Uuid, message: String },

    #[error(transparent)]
    Store(#[from] AppError),
}

pub struct Orchestrator {
    storage: Storage,
    sink: BulkCopySink,
    status: StatusStore,
    queue: WorkQueue,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        storage: Storage,
        sink: BulkCopySink,
        status: StatusStore,
        queue: WorkQueue,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            sink,
            status,
            queue,
            retry,
        }
    }

    /// Process one uploaded file end to end. Returns the final row counts,
    /// or an error describing why nothing was loaded.
    #[instrument(skip(self))]
    pub async fn process_upload(&self, upload_id: Uuid) -> Result<RowStats, ProcessError> {
        let record = self
            .status
            .get(upload_id)
            .await?
            .ok_or(ProcessError::NotFound(upload_id))?;

        if !self.status.begin_processing(upload_id).await? {
            return Err(ProcessError::NotProcessable(upload_id));
        }

        info!(%upload_id, object_key = %record.object_key, "bulk load started");

        match self.load(&record.object_key).await {
            Ok(stats) => {
                if let Err(e) = self.storage.delete(&record.object_key).await {
                    warn!(%upload_id, "failed to delete processed object: {}", e);
                }

                match self
                    .status
                    .complete(upload_id, stats.processed(), stats.invalid)
                    .await
                {
                    Ok(true) => {
                        self.enqueue_callback(
                            upload_id,
                            record.callback_url.as_deref(),
                            WebhookCallbackPayload::completed(
                                upload_id,
                                stats.processed(),
                                stats.invalid,
                            ),
                        )
                        .await;
                    },
                    Ok(false) => warn!(%upload_id, "upload already in a terminal state"),
                    Err(e) => error!(%upload_id, "failed to record completion: {}", e),
                }

                Ok(stats)
            },
            Err(e) => {
                let message = e.to_string();
                warn!(%upload_id, error = %message, "bulk load failed, file kept for retry");

                match self.status.fail(upload_id, &message).await {
                    Ok(true) => {
                        self.enqueue_callback(
                            upload_id,
                            record.callback_url.as_deref(),
                            WebhookCallbackPayload::failed(upload_id, message.clone()),
                        )
                        .await;
                    },
                    Ok(false) => warn!(%upload_id, "upload already in a terminal state"),
                    Err(e) => error!(%upload_id, "failed to record failure: {}", e),
                }

                Err(ProcessError::Pipeline { upload_id, message })
            },
        }
    }

    /// Stream the object through parse -> validate -> format into one COPY
    /// session. Any stage error aborts the COPY, so the table is untouched.
    async fn load(&self, object_key: &str) -> anyhow::Result<RowStats> {
        let mut bytes = self.storage.download_stream(object_key).await?;

        let (row_tx, mut row_rx) = mpsc::channel::<Vec<String>>(STAGE_BUFFER);
        let (valid_tx, mut valid_rx) = mpsc::channel::<ValidatedRow>(STAGE_BUFFER);
        let (line_tx, mut line_rx) = mpsc::channel::<String>(STAGE_BUFFER);

        // A closed receiver means a downstream stage bailed out; the stage
        // just stops and lets the join below surface the primary error.
        let parse_task = tokio::spawn(async move {
            let mut parser = CsvParser::new();
            while let Some(chunk) = bytes.try_next().await? {
                for row in parser.push_chunk(&chunk)? {
                    if row_tx.send(row).await.is_err() {
                        return Ok(());
                    }
                }
            }
            if let Some(row) = parser.finish()? {
                let _ = row_tx.send(row).await;
            }
            Ok::<(), anyhow::Error>(())
        });

        let validate_task = tokio::spawn(async move {
            let header = match row_rx.recv().await {
                Some(header) => header,
                None => return Ok(RowStats::default()),
            };
            let mut validator = RowValidator::from_header(&header)?;

            while let Some(row) = row_rx.recv().await {
                if let Some(valid) = validator.validate(&row) {
                    if valid_tx.send(valid).await.is_err() {
                        break;
                    }
                }
            }
            Ok::<RowStats, anyhow::Error>(validator.stats())
        });

        let format_task = tokio::spawn(async move {
            while let Some(row) = valid_rx.recv().await {
                if line_tx.send(format_row(&row)).await.is_err() {
                    break;
                }
            }
        });

        let mut session = self.sink.begin().await?;
        let mut sink_error: Option<anyhow::Error> = None;

        while let Some(line) = line_rx.recv().await {
            if let Err(e) = session.send(line.as_bytes()).await {
                sink_error = Some(e.into());
                break;
            }
        }
        drop(line_rx);

        let parse_result = parse_task.await?;
        let validate_result = validate_task.await?;
        format_task.await?;

        match (parse_result, validate_result, sink_error) {
            (Ok(()), Ok(stats), None) => {
                let written = session.finish().await?;
                if written != stats.processed() {
                    warn!(
                        written,
                        expected = stats.processed(),
                        "copy row count differs from validated row count"
                    );
                }
                Ok(stats)
            },
            (parse_result, validate_result, sink_error) => {
                if let Err(e) = session.abort("bulk load failed").await {
                    warn!("failed to abort copy session: {}", e);
                }
                let error = if let Err(e) = parse_result {
                    e
                } else if let Err(e) = validate_result {
                    e
                } else {
                    sink_error.unwrap_or_else(|| anyhow!("bulk load failed"))
                };
                Err(error)
            },
        }
    }

    /// Queue the terminal-status callback, keyed so one terminal state
    /// produces at most one delivery job.
    async fn enqueue_callback(
        &self,
        upload_id: Uuid,
        callback_url: Option<&str>,
        payload: WebhookCallbackPayload,
    ) {
        let Some(callback_url) = callback_url else {
            return;
        };

        let key = format!("webhook-{}-{}", upload_id, payload.status);
        let job = WebhookJobData {
            upload_id,
            callback_url: callback_url.to_string(),
            payload,
        };

        match self
            .queue
            .enqueue(&key, JOB_TYPE_WEBHOOK_DELIVERY, &job, self.retry)
            .await
        {
            Ok(true) => info!(%upload_id, callback_url, "webhook delivery queued"),
            Ok(false) => warn!(%upload_id, "webhook delivery already queued"),
            Err(e) => error!(%upload_id, "failed to queue webhook delivery: {}", e),
        }
    }
}
