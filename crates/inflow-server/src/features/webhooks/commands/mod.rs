pub mod ingest;

pub use ingest::{IngestWebhookCommand, IngestWebhookError, IngestWebhookResponse};
