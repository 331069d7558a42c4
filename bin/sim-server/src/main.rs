//! SimCast server
//!
//! Wires the simulation together: configuration store, record stores,
//! notification client, broker manager, processing engine and the REST
//! surface. The engine connects to the broker in the background with
//! unbounded retry, so the configuration API is reachable while the broker
//! is down; no events flow until the connection succeeds.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sim_api::{create_router, AppState, EntityService};
use sim_broker::BrokerManager;
use sim_common::Category;
use sim_config::ConfigStore;
use sim_connector::{HttpNotificationClient, NotifierConfig};
use sim_engine::{EngineRuntime, EventProcessingEngine, RuntimeConfig};
use sim_records::RecordStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Starting SimCast event processor");

    // Configuration; a schema entry without a default is fatal.
    let config = Arc::new(ConfigStore::from_env().context("configuration init failed")?);

    let payments = Arc::new(RecordStore::new(Category::Payment));
    let shipments = Arc::new(RecordStore::new(Category::Shipment));

    let notifier = Arc::new(
        HttpNotificationClient::new(config.clone(), NotifierConfig::default())
            .context("notification client init failed")?,
    );

    let broker_uri = config
        .string_value("RABBITMQ_URL")
        .context("RABBITMQ_URL is not set")?;
    let broker = Arc::new(BrokerManager::new(
        broker_uri,
        Category::ALL
            .iter()
            .map(|category| category.queue_name().to_string())
            .collect(),
    ));

    let engine = Arc::new(EventProcessingEngine::new(
        config.clone(),
        payments.clone(),
        shipments.clone(),
        notifier.clone(),
    ));
    let runtime = EngineRuntime::start(engine, broker.clone(), RuntimeConfig::default());

    let state = AppState {
        config: config.clone(),
        payments: Arc::new(EntityService::new(
            payments,
            notifier.clone(),
            broker.clone(),
        )),
        shipments: Arc::new(EntityService::new(shipments, notifier, broker)),
    };
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let api_port: u16 = std::env::var("API_PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080);
    let listener = TcpListener::bind(format!("0.0.0.0:{api_port}")).await?;
    info!(port = api_port, "Starting HTTP API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown signal received...");
    runtime.shutdown().await;
    info!("SimCast shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
