//! Object storage configuration

/// S3-compatible storage configuration (AWS S3 or MinIO)
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Custom endpoint for MinIO or other S3-compatible stores.
    pub endpoint: Option<String>,
    /// Path-style addressing, required by MinIO.
    pub path_style: bool,
}

impl StorageConfig {
    /// Load storage configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let bucket = std::env::var("STORAGE_BUCKET")
            .map_err(|_| anyhow::anyhow!("STORAGE_BUCKET must be set"))?;

        Ok(Self {
            bucket,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key: std::env::var("STORAGE_ACCESS_KEY")
                .map_err(|_| anyhow::anyhow!("STORAGE_ACCESS_KEY must be set"))?,
            secret_key: std::env::var("STORAGE_SECRET_KEY")
                .map_err(|_| anyhow::anyhow!("STORAGE_SECRET_KEY must be set"))?,
            endpoint: std::env::var("STORAGE_ENDPOINT").ok(),
            path_style: std::env::var("STORAGE_PATH_STYLE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        })
    }
}
