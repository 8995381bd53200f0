use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::orchestrator::ProcessError;
use crate::pipeline::Orchestrator;

#[derive(Debug, Clone)]
pub struct ProcessUploadCommand {
    pub upload_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUploadResponse {
    pub success: bool,
    pub upload_id: Uuid,
    pub rows_processed: u64,
    pub rows_invalid: u64,
}

/// Run the bulk load for one upload.
#[tracing::instrument(skip(orchestrator, command), fields(upload_id = %command.upload_id))]
pub async fn handle(
    orchestrator: Arc<Orchestrator>,
    command: ProcessUploadCommand,
) -> Result<ProcessUploadResponse, ProcessError> {
    let stats = orchestrator.process_upload(command.upload_id).await?;

    Ok(ProcessUploadResponse {
        success: true,
        upload_id: command.upload_id,
        rows_processed: stats.processed(),
        rows_invalid: stats.invalid,
    })
}
