//! Delivery of outcome notifications to the external payment and shipment
//! services.
//!
//! One POST per outcome, fire-and-forget: failures are logged and reported
//! as a result variant, never raised to the caller, and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

use sim_common::{Category, OutcomeUpdate, PaymentStatus, ShipmentStatus};
use sim_config::ConfigStore;

/// Terminal result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyResult {
    /// The downstream service answered 2xx.
    Delivered,
    /// No endpoint configured for the category; no request was issued.
    EndpointUnset,
    /// The downstream service answered outside 2xx.
    Rejected,
    /// The request never completed (connect failure, timeout).
    TransportError,
}

/// Seam between the processing paths and the HTTP delivery. Both the
/// engine's automatic outcomes and the manual-update path report through
/// this trait.
#[async_trait]
pub trait OutcomeNotifier: Send + Sync {
    async fn send_outcome(&self, update: &OutcomeUpdate) -> NotifyResult;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentStatusBody<'a> {
    payment_id: &'a str,
    status: PaymentStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentStatusBody<'a> {
    shipment_id: &'a str,
    status: ShipmentStatus,
}

/// Notification client backed by reqwest. The target endpoint is resolved
/// per category from the configuration store or the environment
/// (`PAYMENT_URL` / `SHIPMENT_URL`) on every send, so a late-set URL is
/// picked up without a restart.
pub struct HttpNotificationClient {
    config: Arc<ConfigStore>,
    client: reqwest::Client,
}

impl HttpNotificationClient {
    pub fn new(config: Arc<ConfigStore>, notifier_config: NotifierConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(notifier_config.connect_timeout)
            .timeout(notifier_config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, category: Category) -> Option<String> {
        self.config.string_value(category.endpoint_key())
    }

    async fn post(&self, endpoint: &str, body: &impl Serialize) -> NotifyResult {
        match self.client.post(endpoint).json(body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(endpoint = %endpoint, "Outcome delivered");
                NotifyResult::Delivered
            }
            Ok(response) => {
                error!(
                    endpoint = %endpoint,
                    status = %response.status(),
                    "Request failed"
                );
                NotifyResult::Rejected
            }
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Error sending request");
                NotifyResult::TransportError
            }
        }
    }
}

#[async_trait]
impl OutcomeNotifier for HttpNotificationClient {
    async fn send_outcome(&self, update: &OutcomeUpdate) -> NotifyResult {
        let category = update.category();
        let Some(endpoint) = self.endpoint(category) else {
            error!(key = category.endpoint_key(), "{category} URL not set");
            return NotifyResult::EndpointUnset;
        };
        match update {
            OutcomeUpdate::Payment { payment_id, status } => {
                let body = PaymentStatusBody {
                    payment_id,
                    status: *status,
                };
                self.post(&endpoint, &body).await
            }
            OutcomeUpdate::Shipment {
                shipment_id,
                status,
            } => {
                let body = ShipmentStatusBody {
                    shipment_id,
                    status: *status,
                };
                self.post(&endpoint, &body).await
            }
        }
    }
}
