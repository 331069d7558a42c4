//! RabbitMQ connection management.
//!
//! Owns the single connection and channel shared by all queues, declares
//! the durable queues, and drives consumer streams. Recycling the
//! connection is the deliberate backpressure-release mechanism: closing the
//! channel returns every unacknowledged delivery to the broker, which
//! redelivers them to the consumers registered on the fresh channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection not established")]
    NotConnected,

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}

/// Acknowledgment handle for one delivery. Leaving a delivery
/// unacknowledged is a valid terminal decision: the broker holds it until
/// the channel is recycled.
#[async_trait]
pub trait DeliveryAck: Send + Sync {
    async fn ack(&self);
}

struct LapinAck {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl DeliveryAck for LapinAck {
    async fn ack(&self) {
        if let Err(e) = self.acker.ack(BasicAckOptions::default()).await {
            error!(error = %e, "Failed to acknowledge delivery");
        }
    }
}

/// Handler invoked once per inbound delivery. Deliveries of one queue are
/// handled one at a time, in arrival order.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn on_delivery(&self, queue: &str, payload: &[u8], ack: &dyn DeliveryAck);
}

/// Publishing seam used by the registration path.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

#[derive(Default)]
struct BrokerLink {
    connection: Option<Connection>,
    channel: Option<Channel>,
}

/// Owns the broker connection and channel as one unit; both are torn down
/// and recreated together, never partially.
pub struct BrokerManager {
    uri: String,
    queues: Vec<String>,
    retry_delay: Duration,
    link: Mutex<BrokerLink>,
    handlers: Mutex<HashMap<String, Arc<dyn DeliveryHandler>>>,
}

impl BrokerManager {
    pub fn new(uri: impl Into<String>, queues: Vec<String>) -> Self {
        Self {
            uri: uri.into(),
            queues,
            retry_delay: RETRY_DELAY,
            link: Mutex::new(BrokerLink::default()),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Opens connection and channel and declares all durable queues.
    /// Returns whether the attempt succeeded; never propagates the error.
    pub async fn connect(&self) -> bool {
        match self.try_connect().await {
            Ok(()) => {
                info!("Connected to RabbitMQ");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to RabbitMQ");
                false
            }
        }
    }

    async fn try_connect(&self) -> Result<(), BrokerError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        for queue in &self.queues {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..QueueDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }
        let mut link = self.link.lock().await;
        link.connection = Some(connection);
        link.channel = Some(channel);
        Ok(())
    }

    /// Retries [`connect`](Self::connect) until it succeeds. The only
    /// unbounded-retry path in the system; callers decide whether their
    /// startup may block on it.
    pub async fn connect_with_retry(&self) {
        while !self.connect().await {
            debug!(
                seconds = self.retry_delay.as_secs(),
                "Retrying broker connection"
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Registers a delivery handler for `queue` and starts consuming on the
    /// current channel. The handler survives reconnects: it is re-attached
    /// to every fresh channel.
    pub async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<(), BrokerError> {
        self.handlers
            .lock()
            .await
            .insert(queue.to_string(), handler.clone());
        self.spawn_consumer(queue, handler).await
    }

    async fn spawn_consumer(
        &self,
        queue: &str,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<(), BrokerError> {
        let channel = {
            let link = self.link.lock().await;
            link.channel.clone().ok_or(BrokerError::NotConnected)?
        };
        let mut consumer = channel
            .basic_consume(
                queue,
                &format!("{queue}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let queue_name = queue.to_string();
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        let payload = delivery.data;
                        let ack = LapinAck {
                            acker: delivery.acker,
                        };
                        handler.on_delivery(&queue_name, &payload, &ack).await;
                    }
                    Err(e) => {
                        warn!(queue = %queue_name, error = %e, "Consumer stream error");
                        break;
                    }
                }
            }
            // The stream ends when the channel closes; a reconnect spawns a
            // fresh consumer.
            debug!(queue = %queue_name, "Consumer stream closed");
        });
        Ok(())
    }

    /// Closes channel and connection (tolerating either being already
    /// gone), reconnects with unbounded retry, and re-registers every
    /// consumer. Unacknowledged deliveries return to their queues and are
    /// redelivered on the fresh channel.
    pub async fn reconnect(&self) {
        debug!("Reconnecting to RabbitMQ");
        self.close_link().await;
        self.connect_with_retry().await;

        let handlers: Vec<(String, Arc<dyn DeliveryHandler>)> = self
            .handlers
            .lock()
            .await
            .iter()
            .map(|(queue, handler)| (queue.clone(), handler.clone()))
            .collect();
        for (queue, handler) in handlers {
            if let Err(e) = self.spawn_consumer(&queue, handler).await {
                error!(queue = %queue, error = %e, "Failed to re-register consumer");
            }
        }
    }

    /// Closes channel and connection if present.
    pub async fn shutdown(&self) {
        self.close_link().await;
    }

    async fn close_link(&self) {
        let (channel, connection) = {
            let mut link = self.link.lock().await;
            (link.channel.take(), link.connection.take())
        };
        if let Some(channel) = channel {
            if let Err(e) = channel.close(200, "recycling").await {
                debug!(error = %e, "Channel was already closed");
            }
        }
        if let Some(connection) = connection {
            if let Err(e) = connection.close(200, "recycling").await {
                debug!(error = %e, "Connection was already closed");
            }
        }
    }
}

#[async_trait]
impl QueuePublisher for BrokerManager {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let channel = {
            let link = self.link.lock().await;
            link.channel.clone().ok_or(BrokerError::NotConnected)?
        };
        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_connection() {
        let manager = BrokerManager::new("amqp://localhost", vec!["payments-queue".to_string()]);
        let result = manager.publish("payments-queue", b"{}").await;
        assert!(matches!(result, Err(BrokerError::NotConnected)));
    }

    #[tokio::test]
    async fn test_consume_without_connection() {
        struct NoopHandler;

        #[async_trait]
        impl DeliveryHandler for NoopHandler {
            async fn on_delivery(&self, _queue: &str, _payload: &[u8], _ack: &dyn DeliveryAck) {}
        }

        let manager = BrokerManager::new("amqp://localhost", vec!["payments-queue".to_string()]);
        let result = manager
            .consume("payments-queue", Arc::new(NoopHandler))
            .await;
        assert!(matches!(result, Err(BrokerError::NotConnected)));
    }

    #[tokio::test]
    async fn test_shutdown_tolerates_absent_link() {
        let manager = BrokerManager::new("amqp://localhost", vec![]);
        manager.shutdown().await;
        manager.shutdown().await;
    }
}
