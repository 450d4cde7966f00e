// Main entry point for the approval server

use std::sync::Arc;

use anyhow::{Context, Result};
use approval_core::domains::approval::{CorrelationRegistry, InMemoryMessageCorrelation};
use approval_core::domains::approval::WebhookEventRouter;
use approval_core::kernel::deps::{BulkSmsAdapter, WhatsAppAdapter};
use approval_core::kernel::stores::{PgApprovalStore, PgOtpStore, PgResendMappingStore};
use approval_core::kernel::ServerDeps;
use approval_core::server::{build_app, spawn_event_worker, AppState, EventQueue, EVENT_QUEUE_DEPTH};
use approval_core::Config;
use bulksms::{BulkSmsOptions, BulkSmsService};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whatsapp::{WhatsAppOptions, WhatsAppService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,approval_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WhatsApp Approval Server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Transport clients
    let whatsapp = Arc::new(WhatsAppService::new(WhatsAppOptions {
        api_url: config.whatsapp_api_url.clone(),
        api_token: config.whatsapp_api_token.clone(),
    }));
    let bulksms = Arc::new(BulkSmsService::new(BulkSmsOptions {
        api_url: config.bulksms_api_url.clone(),
        api_token: config.bulksms_api_token.clone(),
    }));

    // Dependency container
    let deps = ServerDeps::new(
        Arc::new(PgApprovalStore::new(pool.clone())),
        Arc::new(PgOtpStore::new(pool.clone())),
        Arc::new(PgResendMappingStore::new(pool.clone())),
        Arc::new(WhatsAppAdapter::new(whatsapp)),
        Arc::new(BulkSmsAdapter::new(bulksms)),
        Arc::new(InMemoryMessageCorrelation::new()),
        Arc::new(CorrelationRegistry::new()),
    );

    // Background webhook worker
    let (queue, rx) = EventQueue::bounded(EVENT_QUEUE_DEPTH);
    let router = WebhookEventRouter::new(deps.clone());
    spawn_event_worker(rx, router);

    // Build application
    let app = build_app(AppState {
        db_pool: pool,
        deps,
        queue,
        verify_token: config.webhook_verify_token.clone(),
    });

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Webhook endpoint: http://localhost:{}/webhook", config.port);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
