pub mod commands;
pub mod routes;

pub use commands::{IngestWebhookCommand, IngestWebhookError, IngestWebhookResponse};

pub use routes::webhook_routes;
