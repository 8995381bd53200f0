//! S3-compatible object storage client
//!
//! Bulk uploads are staged here between the HTTP upload and the streaming
//! load into Postgres. The client only covers what the pipeline needs:
//! buffered upload, streaming download, delete, and existence checks.

use anyhow::{anyhow, Context, Result};
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub mod config;

pub use config::StorageConfig;

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!("Initializing storage for bucket: {}", config.bucket);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "inflow-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    /// Object key where one upload's source file lives.
    pub fn upload_key(&self, upload_id: Uuid) -> String {
        format!("uploads/{}.csv", upload_id)
    }

    /// Location string returned to upload clients.
    pub fn location(&self, key: &str) -> String {
        format!("{}/{}", self.bucket, key)
    }

    #[instrument(skip(self, data))]
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<UploadResult> {
        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request.send().await.context("Failed to upload to S3")?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    /// Open a streaming read of an object. The returned stream yields chunks
    /// on demand, so callers never hold the whole file in memory.
    #[instrument(skip(self))]
    pub async fn download_stream(&self, key: &str) -> Result<ByteStream> {
        debug!("Getting stream from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to get stream from S3: {}", key))?;

        Ok(response.body)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        debug!("Deleting s3://{}/{}", self.bucket, key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to delete from S3: {}", key))?;

        info!("Successfully deleted s3://{}/{}", self.bucket, key);

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("404") {
                    Ok(false)
                } else {
                    Err(anyhow!("Failed to check S3 object existence: {}", e))
                }
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_storage() -> Storage {
        Storage {
            client: Client::from_conf(aws_sdk_s3::Config::builder().build()),
            bucket: "test-bucket".to_string(),
        }
    }

    #[test]
    fn test_upload_key() {
        let storage = test_storage();
        let id = Uuid::nil();
        assert_eq!(
            storage.upload_key(id),
            "uploads/00000000-0000-0000-0000-000000000000.csv"
        );
    }

    #[test]
    fn test_location() {
        let storage = test_storage();
        assert_eq!(storage.location("uploads/x.csv"), "test-bucket/uploads/x.csv");
    }

    #[test]
    fn test_calculate_sha256() {
        let checksum = calculate_sha256(b"Hello, World!");
        assert_eq!(
            checksum,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }
}
