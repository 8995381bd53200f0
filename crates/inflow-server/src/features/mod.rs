//! Feature modules implementing the inflow HTTP API
//!
//! Each feature is a vertical slice with its own commands, queries, and
//! routes:
//!
//! - **webhooks**: single-event ingestion from external providers
//! - **uploads**: bulk CSV staging, processing, and status
//!
//! Commands validate their input, carry a dedicated error type, and are
//! invoked from thin route handlers.

pub mod uploads;
pub mod webhooks;

use std::sync::Arc;

use axum::Router;

use crate::pipeline::Orchestrator;
use crate::queue::{RetryPolicy, WorkQueue};
use crate::status::StatusStore;
use crate::storage::Storage;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub db: sqlx::PgPool,
    pub storage: Storage,
    pub queue: WorkQueue,
    pub status: StatusStore,
    pub orchestrator: Arc<Orchestrator>,
    pub retry: RetryPolicy,
}

/// Creates the API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/webhooks", webhooks::webhook_routes().with_state(state.clone()))
        .nest("/upload", uploads::upload_routes().with_state(state))
}
