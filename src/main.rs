use std::sync::Arc;

use anyhow::Context;
use tracing::info_span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_management_service::config::{ServiceConfig, StoreBackend};
use order_management_service::db::{MemoryStore, PgStore, Repository};
use order_management_service::handler::OrderHandler;
use order_management_service::metrics::{self, Metrics};
use order_management_service::models::Order;
use order_management_service::proto;
use order_management_service::service::OrderService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_management_service=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order management service");

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    // === 1. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);

    // Metrics HTTP server runs on its own actix system thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(metrics_registry, metrics_addr)) {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 2. Data Access Layer ===
    match config.store {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;

            tracing::info!("Connecting to Postgres...");
            let store = PgStore::connect(url, config.db_max_connections, info_span!("pg_store")).await?;

            if config.run_migrations {
                store.migrate().await?;
            }

            serve(Arc::new(store), metrics, &config).await
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; orders are lost on shutdown");
            serve(Arc::new(MemoryStore::new()), metrics, &config).await
        }
    }
}

/// === 3. gRPC server with health and reflection ===
async fn serve<S: Repository<Order>>(
    store: Arc<S>,
    metrics: Arc<Metrics>,
    config: &ServiceConfig,
) -> anyhow::Result<()> {
    let service = OrderService::new(store, info_span!("order_service"));
    let handler = OrderHandler::new(service, metrics, info_span!("grpc_handler"));

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<proto::order_service_server::OrderServiceServer<OrderHandler<S>>>()
        .await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .context("failed to build reflection service")?;

    tracing::info!("📡 gRPC server listening on {}", config.grpc_addr);

    tonic::transport::Server::builder()
        .add_service(health_service)
        .add_service(reflection)
        .add_service(handler.into_server())
        .serve_with_shutdown(config.grpc_addr, shutdown_signal())
        .await
        .context("gRPC server failed")?;

    tracing::info!("👋 Order management service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
