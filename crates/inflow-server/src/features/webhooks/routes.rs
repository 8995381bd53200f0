use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use crate::api::response::{ApiResponse, ErrorResponse};
use crate::features::FeatureState;

use super::commands::{ingest, IngestWebhookCommand, IngestWebhookError};

pub fn webhook_routes() -> Router<FeatureState> {
    Router::new().route("/:provider", post(ingest_webhook))
}

#[tracing::instrument(skip(state, body), fields(provider = %provider))]
async fn ingest_webhook(
    State(state): State<FeatureState>,
    Path(provider): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, WebhookApiError> {
    let command = IngestWebhookCommand { provider, body };

    let response = ingest::handle(state.queue, state.retry, command).await?;

    tracing::info!(job_id = %response.job_id, "webhook accepted");

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(response))).into_response())
}

#[derive(Debug)]
struct WebhookApiError(IngestWebhookError);

impl From<IngestWebhookError> for WebhookApiError {
    fn from(err: IngestWebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        match self.0 {
            IngestWebhookError::ProviderRequired
            | IngestWebhookError::EventIdRequired
            | IngestWebhookError::TimestampInvalid
            | IngestWebhookError::DataInvalid => {
                let error = ErrorResponse::new("VALIDATION_ERROR", self.0.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            IngestWebhookError::Queue(e) => {
                tracing::error!("Failed to enqueue webhook: {}", e);
                let error = ErrorResponse::new("QUEUE_ERROR", "Failed to accept event");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_maps_to_400() {
        let response = WebhookApiError(IngestWebhookError::EventIdRequired).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_routes_structure() {
        let router = webhook_routes();
        assert!(format!("{:?}", router).contains("Router"));
    }
}
