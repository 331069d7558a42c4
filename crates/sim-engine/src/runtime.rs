use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info};

use sim_broker::{BrokerManager, DeliveryAck, DeliveryHandler};
use sim_common::Category;

use crate::engine::EventProcessingEngine;

/// Timing configuration for the runtime's periodic tasks.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Period of the window reset and the configuration refresh.
    pub tick_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
        }
    }
}

struct CategoryConsumer {
    category: Category,
    engine: Arc<EventProcessingEngine>,
}

#[async_trait]
impl DeliveryHandler for CategoryConsumer {
    async fn on_delivery(&self, _queue: &str, payload: &[u8], ack: &dyn DeliveryAck) {
        self.engine.on_message(self.category, payload, ack).await;
    }
}

/// Drives the engine against the broker: connects (with unbounded retry),
/// registers one consumer per category, and runs the periodic window reset
/// and configuration refresh. All tasks stop on shutdown.
pub struct EngineRuntime {
    broker: Arc<BrokerManager>,
    shutdown_tx: broadcast::Sender<()>,
}

impl EngineRuntime {
    pub fn start(
        engine: Arc<EventProcessingEngine>,
        broker: Arc<BrokerManager>,
        config: RuntimeConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        // Startup: the connect loop may block indefinitely while the broker
        // is down, so it runs in the background and only gates event flow,
        // not the rest of the process.
        {
            let engine = engine.clone();
            let broker = broker.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                tokio::select! {
                    _ = Self::bootstrap(engine, broker) => {}
                    _ = shutdown_rx.recv() => {
                        info!("Engine startup aborted by shutdown");
                    }
                }
            });
        }

        // Window reset. A category that paused with a positive limit forces
        // one connection-wide recycle so its unacked backlog is redelivered.
        {
            let engine = engine.clone();
            let broker = broker.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            let interval = config.tick_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // The first tick fires immediately; the windows are already
                // fresh at startup.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if engine.reset_windows() {
                                broker.reconnect().await;
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            info!("Window reset task shutting down");
                            break;
                        }
                    }
                }
            });
        }

        // Configuration refresh, independent of the reset tick.
        {
            let engine = engine.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            let interval = config.tick_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            engine.refresh_settings();
                        }
                        _ = shutdown_rx.recv() => {
                            info!("Configuration refresh task shutting down");
                            break;
                        }
                    }
                }
            });
        }

        Self {
            broker,
            shutdown_tx,
        }
    }

    async fn bootstrap(engine: Arc<EventProcessingEngine>, broker: Arc<BrokerManager>) {
        engine.refresh_settings();
        broker.connect_with_retry().await;
        for category in Category::ALL {
            let handler = Arc::new(CategoryConsumer {
                category,
                engine: engine.clone(),
            });
            if let Err(e) = broker.consume(category.queue_name(), handler).await {
                error!(queue = category.queue_name(), error = %e, "Failed to register consumer");
            }
        }
        info!("Event consumers registered");
    }

    /// Stops the periodic tasks and closes channel and connection.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.broker.shutdown().await;
    }
}
