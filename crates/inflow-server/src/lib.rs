//! Inflow Server Library
//!
//! Asynchronous event ingestion and delivery service.
//!
//! # Overview
//!
//! Events reach the system through two paths and land in PostgreSQL:
//!
//! - **Single-event webhooks**: `POST /webhooks/{provider}` enqueues the event
//!   on a durable work queue; a background consumer performs an idempotency
//!   check, persists the event, and broadcasts a completion notification.
//! - **Bulk CSV uploads**: files are staged in S3-compatible object storage,
//!   then streamed through a parse → validate → format pipeline into a
//!   Postgres COPY session. Upload lifecycle is tracked in a status store and
//!   an optional callback URL is notified on completion or failure.
//!
//! # Delivery guarantees
//!
//! The work queue is at-least-once: consumers may see a job more than once
//! and are idempotent at the business level. Storage writes happen at most
//! once per event id (idempotency marker plus a uniqueness constraint).
//! Outbound webhooks are retried with exponential backoff and retained for
//! inspection once attempts are exhausted.
//!
//! # Framework Stack
//!
//! - **Axum**: HTTP routing, multipart uploads, WebSocket fan-out
//! - **SQLx**: PostgreSQL access, migrations, and the COPY bulk protocol
//! - **aws-sdk-s3**: object storage staging for bulk uploads

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod idempotency;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod status;
pub mod storage;
pub mod worker;

// Re-export commonly used types
pub use error::{AppError, AppResult};
