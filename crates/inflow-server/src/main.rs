//! Inflow Server - Main entry point

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use inflow_common::logging::{init_logging, LogConfig};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tracing::info;

use inflow_server::{
    config::Config,
    features,
    idempotency::IdempotencyStore,
    middleware,
    notify::{self, Notifier},
    pipeline::{BulkCopySink, Orchestrator},
    queue::{RetryPolicy, WorkQueue},
    status::StatusStore,
    storage::{config::StorageConfig, Storage},
    worker::{EventProcessor, WebhookDeliverer, Worker, WorkerOptions},
};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    db: sqlx::PgPool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let mut log_config = LogConfig::from_env()?.with_file_prefix("inflow-server");
    if log_config.filter_directives.is_none() {
        log_config = log_config
            .with_filter_directives("inflow_server=debug,tower_http=debug,sqlx=info");
    }

    init_logging(&log_config)?;

    info!("Starting Inflow Server");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    // Initialize S3/MinIO storage
    let storage_config = StorageConfig::from_env()?;
    let storage = Storage::new(storage_config).await?;
    info!("Storage client initialized");

    // Run migrations
    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let retry = RetryPolicy {
        max_attempts: config.queue.max_attempts,
        initial_backoff_ms: config.queue.initial_backoff_ms,
    };
    let queue = WorkQueue::new(db_pool.clone());
    let status = StatusStore::new(db_pool.clone(), config.status.retention_secs);
    let idempotency = IdempotencyStore::new(Duration::from_secs(config.idempotency.ttl_secs));
    let notifier = Notifier::new();

    let orchestrator = Arc::new(Orchestrator::new(
        storage.clone(),
        BulkCopySink::new(db_pool.clone()),
        status.clone(),
        queue.clone(),
        retry,
    ));

    // Background consumers and the retention sweeper share one shutdown flag
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let event_worker = Worker::new(
        queue.clone(),
        Arc::new(EventProcessor::new(
            db_pool.clone(),
            idempotency.clone(),
            notifier.clone(),
        )),
        WorkerOptions {
            concurrency: config.workers.event_concurrency,
            poll_interval: Duration::from_millis(config.queue.poll_interval_ms),
            reclaim_after: Duration::from_secs(config.queue.reclaim_after_secs),
        },
    );
    let event_worker_handle = tokio::spawn(event_worker.run(shutdown_rx.clone()));

    let webhook_worker = Worker::new(
        queue.clone(),
        Arc::new(WebhookDeliverer::new(Duration::from_secs(
            config.workers.webhook_timeout_secs,
        ))?),
        WorkerOptions {
            concurrency: config.workers.webhook_concurrency,
            poll_interval: Duration::from_millis(config.queue.poll_interval_ms),
            reclaim_after: Duration::from_secs(config.queue.reclaim_after_secs),
        },
    );
    let webhook_worker_handle = tokio::spawn(webhook_worker.run(shutdown_rx.clone()));

    let sweeper_handle = tokio::spawn(run_sweeper(
        status.clone(),
        idempotency.clone(),
        shutdown_rx,
    ));

    info!("Background workers started");

    // Create application state
    let state = AppState { db: db_pool.clone() };

    let feature_state = features::FeatureState {
        db: db_pool,
        storage,
        queue,
        status,
        orchestrator,
        retry,
    };

    // Build the application router
    let app = create_router(state, feature_state, notifier, &config);

    // Create socket address
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    // Stop the background tasks and let in-flight jobs drain
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(event_worker_handle, webhook_worker_handle, sweeper_handle);

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(
    state: AppState,
    feature_state: features::FeatureState,
    notifier: Notifier,
    config: &Config,
) -> Router {
    let feature_routes = features::router(feature_state);

    let notification_routes = Router::new()
        .route("/notifications/ws", get(notify::ws_handler))
        .with_state(notifier);

    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
        .merge(feature_routes)
        .merge(notification_routes)
        // Apply layers from innermost to outermost
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Result<Response, StatusCode> {
    // Check database connectivity
    match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Periodically drop expired upload records and idempotency markers.
async fn run_sweeper(
    status: StatusStore,
    idempotency: IdempotencyStore,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                if let Err(e) = status.sweep_expired().await {
                    tracing::error!("Failed to sweep expired uploads: {}", e);
                }
                idempotency.sweep().await;
            },
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give ongoing requests time to complete
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
