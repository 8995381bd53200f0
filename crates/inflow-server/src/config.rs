//! Configuration management

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default multipart upload limit in bytes (5 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024 * 1024;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/inflow";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default delivery attempts per queue job.
pub const DEFAULT_QUEUE_MAX_ATTEMPTS: i32 = 3;

/// Default initial retry backoff in milliseconds (doubles per retry).
pub const DEFAULT_QUEUE_BACKOFF_MS: u64 = 1000;

/// Default queue poll interval when no jobs are pending, in milliseconds.
pub const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 500;

/// Default age after which a locked job is returned to pending, in seconds.
pub const DEFAULT_QUEUE_RECLAIM_AFTER_SECS: u64 = 300;

/// Default concurrency for the event ingestion consumer.
pub const DEFAULT_EVENT_CONCURRENCY: usize = 4;

/// Default concurrency for outbound webhook delivery (kept low so
/// third-party receivers are not overwhelmed).
pub const DEFAULT_WEBHOOK_CONCURRENCY: usize = 1;

/// Default per-attempt timeout for outbound webhook calls, in seconds.
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Default idempotency marker TTL in seconds (24 hours).
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 60 * 60 * 24;

/// Default upload status retention in seconds (7 days).
pub const DEFAULT_STATUS_RETENTION_SECS: u64 = 604_800;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub workers: WorkerConfig,
    pub idempotency: IdempotencyConfig,
    pub status: StatusConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Work queue retry policy and polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_attempts: i32,
    pub initial_backoff_ms: u64,
    pub poll_interval_ms: u64,
    pub reclaim_after_secs: u64,
}

/// Consumer concurrency and outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub event_concurrency: usize,
    pub webhook_concurrency: usize,
    pub webhook_timeout_secs: u64,
}

/// Idempotency store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    pub ttl_secs: u64,
}

/// Upload status store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub retention_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("INFLOW_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("INFLOW_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse(
                    "INFLOW_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
                max_upload_bytes: env_parse("INFLOW_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_parse(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_parse(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            queue: QueueConfig {
                max_attempts: env_parse("QUEUE_MAX_ATTEMPTS", DEFAULT_QUEUE_MAX_ATTEMPTS),
                initial_backoff_ms: env_parse("QUEUE_BACKOFF_MS", DEFAULT_QUEUE_BACKOFF_MS),
                poll_interval_ms: env_parse(
                    "QUEUE_POLL_INTERVAL_MS",
                    DEFAULT_QUEUE_POLL_INTERVAL_MS,
                ),
                reclaim_after_secs: env_parse(
                    "QUEUE_RECLAIM_AFTER_SECS",
                    DEFAULT_QUEUE_RECLAIM_AFTER_SECS,
                ),
            },
            workers: WorkerConfig {
                event_concurrency: env_parse("WORKER_EVENT_CONCURRENCY", DEFAULT_EVENT_CONCURRENCY),
                webhook_concurrency: env_parse(
                    "WORKER_WEBHOOK_CONCURRENCY",
                    DEFAULT_WEBHOOK_CONCURRENCY,
                ),
                webhook_timeout_secs: env_parse(
                    "WORKER_WEBHOOK_TIMEOUT",
                    DEFAULT_WEBHOOK_TIMEOUT_SECS,
                ),
            },
            idempotency: IdempotencyConfig {
                ttl_secs: env_parse("IDEMPOTENCY_TTL_SECS", DEFAULT_IDEMPOTENCY_TTL_SECS),
            },
            status: StatusConfig {
                retention_secs: env_parse("STATUS_RETENTION_SECS", DEFAULT_STATUS_RETENTION_SECS),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.queue.max_attempts < 1 {
            anyhow::bail!("Queue max_attempts must be at least 1");
        }

        if self.workers.event_concurrency == 0 || self.workers.webhook_concurrency == 0 {
            anyhow::bail!("Worker concurrency must be greater than 0");
        }

        if self.idempotency.ttl_secs == 0 {
            anyhow::bail!("Idempotency TTL must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            queue: QueueConfig {
                max_attempts: DEFAULT_QUEUE_MAX_ATTEMPTS,
                initial_backoff_ms: DEFAULT_QUEUE_BACKOFF_MS,
                poll_interval_ms: DEFAULT_QUEUE_POLL_INTERVAL_MS,
                reclaim_after_secs: DEFAULT_QUEUE_RECLAIM_AFTER_SECS,
            },
            workers: WorkerConfig {
                event_concurrency: DEFAULT_EVENT_CONCURRENCY,
                webhook_concurrency: DEFAULT_WEBHOOK_CONCURRENCY,
                webhook_timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
            },
            idempotency: IdempotencyConfig {
                ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            },
            status: StatusConfig {
                retention_secs: DEFAULT_STATUS_RETENTION_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
            },
        }
    }
}
