use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::response::{ApiResponse, ErrorResponse};
use crate::features::FeatureState;
use crate::pipeline::orchestrator::ProcessError;

use super::commands::{process, upload, ProcessUploadCommand, UploadFileCommand, UploadFileError};
use super::queries::{status, UploadStatusError, UploadStatusQuery};

pub fn upload_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", post(upload_file))
        .route("/:upload_id/process", post(process_upload))
        .route("/:upload_id/status", get(upload_status))
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

#[tracing::instrument(skip(state, multipart, params))]
async fn upload_file(
    State(state): State<FeatureState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Response, UploadApiError> {
    let mut content: Option<Vec<u8>> = None;
    let mut content_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        UploadApiError::Upload(UploadFileError::Storage(anyhow::anyhow!(
            "Failed to read multipart field: {}",
            e
        )))
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        if field_name == "file" {
            content_type = field.content_type().map(|s| s.to_string());
            let data = field.bytes().await.map_err(|e| {
                UploadApiError::Upload(UploadFileError::Storage(anyhow::anyhow!(
                    "Failed to read file bytes: {}",
                    e
                )))
            })?;
            content = Some(data.to_vec());
        }
    }

    let command = UploadFileCommand {
        callback_url: params.callback_url,
        content: content.ok_or(UploadApiError::Upload(UploadFileError::FileRequired))?,
        content_type,
    };

    let response = upload::handle(state.storage, state.status, command).await?;

    tracing::info!(
        upload_id = %response.upload_id,
        object_key = %response.object_key,
        "File staged for processing"
    );

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
async fn process_upload(
    State(state): State<FeatureState>,
    Path(upload_id): Path<Uuid>,
) -> Result<Response, UploadApiError> {
    let command = ProcessUploadCommand { upload_id };

    let response = process::handle(state.orchestrator, command).await?;

    tracing::info!(
        rows_processed = response.rows_processed,
        rows_invalid = response.rows_invalid,
        "Upload processed"
    );

    Ok((StatusCode::OK, Json(response)).into_response())
}

#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
async fn upload_status(
    State(state): State<FeatureState>,
    Path(upload_id): Path<Uuid>,
) -> Result<Response, UploadApiError> {
    let query = UploadStatusQuery { upload_id };

    let response = status::handle(state.status, query).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[derive(Debug)]
enum UploadApiError {
    Upload(UploadFileError),
    Process(ProcessError),
    Status(UploadStatusError),
}

impl From<UploadFileError> for UploadApiError {
    fn from(err: UploadFileError) -> Self {
        Self::Upload(err)
    }
}

impl From<ProcessError> for UploadApiError {
    fn from(err: ProcessError) -> Self {
        Self::Process(err)
    }
}

impl From<UploadStatusError> for UploadApiError {
    fn from(err: UploadStatusError) -> Self {
        Self::Status(err)
    }
}

impl IntoResponse for UploadApiError {
    fn into_response(self) -> Response {
        match self {
            UploadApiError::Upload(UploadFileError::FileRequired)
            | UploadApiError::Upload(UploadFileError::CallbackUrlInvalid) => {
                let error = ErrorResponse::new("VALIDATION_ERROR", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            UploadApiError::Upload(UploadFileError::Storage(_)) => {
                tracing::error!("Storage error during upload: {}", self);
                let error = ErrorResponse::new("STORAGE_ERROR", "A storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
            UploadApiError::Upload(UploadFileError::Status(_)) => {
                tracing::error!("Status error during upload: {}", self);
                let error = ErrorResponse::new("DATABASE_ERROR", "A database error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },

            UploadApiError::Process(ProcessError::NotFound(_)) => {
                let error = ErrorResponse::new("NOT_FOUND", "Upload not found");
                (StatusCode::NOT_FOUND, Json(error)).into_response()
            },
            UploadApiError::Process(ProcessError::NotProcessable(_)) => {
                let error = ErrorResponse::new(
                    "CONFLICT",
                    "Upload is already processing or in a terminal state",
                );
                (StatusCode::CONFLICT, Json(error)).into_response()
            },
            UploadApiError::Process(ProcessError::Pipeline { upload_id, message }) => {
                let body = json!({
                    "success": false,
                    "uploadId": upload_id,
                    "error": message,
                    "message": "File kept in storage for retry",
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            },
            UploadApiError::Process(ProcessError::Store(e)) => {
                tracing::error!("Store error during processing: {}", e);
                let error = ErrorResponse::new("DATABASE_ERROR", "A database error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },

            UploadApiError::Status(UploadStatusError::NotFound) => {
                let error = ErrorResponse::new("NOT_FOUND", "Upload not found");
                (StatusCode::NOT_FOUND, Json(error)).into_response()
            },
            UploadApiError::Status(UploadStatusError::Status(e)) => {
                tracing::error!("Status lookup failed: {}", e);
                let error = ErrorResponse::new("DATABASE_ERROR", "A database error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
        }
    }
}

impl std::fmt::Display for UploadApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload(e) => write!(f, "{}", e),
            Self::Process(e) => write!(f, "{}", e),
            Self::Status(e) => write!(f, "{}", e),
        }
    }
}
