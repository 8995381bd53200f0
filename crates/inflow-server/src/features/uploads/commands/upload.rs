use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{StatusStore, UploadStatus};
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct UploadFileCommand {
    pub callback_url: Option<String>,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileResponse {
    pub upload_id: Uuid,
    pub object_key: String,
    pub status: UploadStatus,
    pub location: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadFileError {
    #[error("File is required and cannot be empty")]
    FileRequired,

    #[error("callbackUrl must be a valid http or https URL")]
    CallbackUrlInvalid,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Status error: {0}")]
    Status(#[from] crate::error::AppError),
}

impl UploadFileCommand {
    pub fn validate(&self) -> Result<(), UploadFileError> {
        if self.content.is_empty() {
            return Err(UploadFileError::FileRequired);
        }

        if let Some(url) = &self.callback_url {
            let parsed =
                reqwest::Url::parse(url).map_err(|_| UploadFileError::CallbackUrlInvalid)?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(UploadFileError::CallbackUrlInvalid);
            }
        }

        Ok(())
    }
}

/// Stage the file in object storage and register the upload record. Rows
/// only reach the database later, when processing is requested.
#[tracing::instrument(skip(storage, status, command), fields(size = command.content.len()))]
pub async fn handle(
    storage: Storage,
    status: StatusStore,
    command: UploadFileCommand,
) -> Result<UploadFileResponse, UploadFileError> {
    command.validate()?;

    let upload_id = Uuid::new_v4();
    let key = storage.upload_key(upload_id);

    let result = storage
        .upload(&key, command.content, command.content_type)
        .await?;

    status
        .create(upload_id, &result.key, command.callback_url.as_deref())
        .await?;

    Ok(UploadFileResponse {
        upload_id,
        location: storage.location(&result.key),
        object_key: result.key,
        status: UploadStatus::Uploaded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(callback_url: Option<&str>, content: &[u8]) -> UploadFileCommand {
        UploadFileCommand {
            callback_url: callback_url.map(|s| s.to_string()),
            content: content.to_vec(),
            content_type: Some("text/csv".to_string()),
        }
    }

    #[test]
    fn test_validation_success_without_callback() {
        assert!(command(None, b"provider,eventId\n").validate().is_ok());
    }

    #[test]
    fn test_validation_success_with_https_callback() {
        assert!(command(Some("https://example.com/hook"), b"x")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_empty_file_is_rejected() {
        assert!(matches!(
            command(None, b"").validate(),
            Err(UploadFileError::FileRequired)
        ));
    }

    #[test]
    fn test_malformed_callback_url_is_rejected() {
        assert!(matches!(
            command(Some("not a url"), b"x").validate(),
            Err(UploadFileError::CallbackUrlInvalid)
        ));
    }

    #[test]
    fn test_non_http_scheme_is_rejected() {
        assert!(matches!(
            command(Some("ftp://example.com/hook"), b"x").validate(),
            Err(UploadFileError::CallbackUrlInvalid)
        ));
    }
}
