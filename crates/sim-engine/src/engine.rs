use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info};

use sim_broker::DeliveryAck;
use sim_common::{extract_entity_id, Category, OutcomeUpdate, PaymentStatus, ShipmentStatus};
use sim_config::{
    ConfigStore, DEFAULT_PER_MINUTE, DEFAULT_PROCESSING_TIME_SECS, DEFAULT_SUCCESS_RATE,
};
use sim_connector::OutcomeNotifier;
use sim_records::RecordStore;

/// Per-category rate-limit window. Reset to `{0, true}` once a minute.
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub processed: u32,
    pub allowed: bool,
}

impl Default for RateWindow {
    fn default() -> Self {
        Self {
            processed: 0,
            allowed: true,
        }
    }
}

/// Cached per-category simulation parameters, refreshed from the
/// configuration store on a fixed schedule.
#[derive(Debug, Clone, Copy)]
pub struct CategorySettings {
    pub max_per_minute: u32,
    /// Upper bound of the simulated processing delay.
    pub processing_time_secs: u64,
    pub success_rate: f64,
}

impl Default for CategorySettings {
    fn default() -> Self {
        Self {
            max_per_minute: DEFAULT_PER_MINUTE as u32,
            processing_time_secs: DEFAULT_PROCESSING_TIME_SECS as u64,
            success_rate: DEFAULT_SUCCESS_RATE,
        }
    }
}

#[derive(Debug, Default)]
struct CategoryState {
    window: RateWindow,
    settings: CategorySettings,
}

/// How the engine disposed of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledged; an outcome will be reported after the simulated delay.
    Scheduled,
    /// Over the per-minute limit; left unacknowledged for redelivery.
    Throttled,
    /// Acknowledged, but the entity was blocked by a manual update; no
    /// automatic outcome.
    Suppressed,
    /// Acknowledged and discarded (unparseable body or missing id).
    Dropped,
}

/// Orchestrates queue consumption for both categories.
///
/// The per-queue consumer handles deliveries one at a time, so the
/// check-then-count sequence on a category's window never interleaves
/// between two deliveries; the mutex guards the window against the
/// concurrent reset and refresh timers.
pub struct EventProcessingEngine {
    config: Arc<ConfigStore>,
    payments: Arc<RecordStore>,
    shipments: Arc<RecordStore>,
    notifier: Arc<dyn OutcomeNotifier>,
    payment_state: Arc<Mutex<CategoryState>>,
    shipment_state: Arc<Mutex<CategoryState>>,
    rng: Arc<Mutex<StdRng>>,
}

impl EventProcessingEngine {
    pub fn new(
        config: Arc<ConfigStore>,
        payments: Arc<RecordStore>,
        shipments: Arc<RecordStore>,
        notifier: Arc<dyn OutcomeNotifier>,
    ) -> Self {
        Self::with_rng(config, payments, shipments, notifier, StdRng::from_entropy())
    }

    /// Engine with a seeded random source, for deterministic scenarios.
    pub fn with_seed(
        config: Arc<ConfigStore>,
        payments: Arc<RecordStore>,
        shipments: Arc<RecordStore>,
        notifier: Arc<dyn OutcomeNotifier>,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            config,
            payments,
            shipments,
            notifier,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        config: Arc<ConfigStore>,
        payments: Arc<RecordStore>,
        shipments: Arc<RecordStore>,
        notifier: Arc<dyn OutcomeNotifier>,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            payments,
            shipments,
            notifier,
            payment_state: Arc::new(Mutex::new(CategoryState::default())),
            shipment_state: Arc::new(Mutex::new(CategoryState::default())),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    fn state(&self, category: Category) -> &Arc<Mutex<CategoryState>> {
        match category {
            Category::Payment => &self.payment_state,
            Category::Shipment => &self.shipment_state,
        }
    }

    fn records(&self, category: Category) -> &Arc<RecordStore> {
        match category {
            Category::Payment => &self.payments,
            Category::Shipment => &self.shipments,
        }
    }

    pub fn window(&self, category: Category) -> RateWindow {
        self.state(category).lock().window
    }

    pub fn settings(&self, category: Category) -> CategorySettings {
        self.state(category).lock().settings
    }

    /// Re-reads every category's simulation parameters from the
    /// configuration store into the engine's cache.
    pub fn refresh_settings(&self) {
        for category in Category::ALL {
            let max_per_minute = self
                .config
                .current_value::<i64>(category.per_minute_key(), DEFAULT_PER_MINUTE)
                .clamp(0, u32::MAX as i64) as u32;
            let processing_time_secs = self
                .config
                .current_value::<i64>(category.processing_time_key(), DEFAULT_PROCESSING_TIME_SECS)
                .max(0) as u64;
            let success_rate = self
                .config
                .current_value::<f64>(category.success_rate_key(), DEFAULT_SUCCESS_RATE);

            let mut state = self.state(category).lock();
            state.settings = CategorySettings {
                max_per_minute,
                processing_time_secs,
                success_rate,
            };
        }
    }

    /// Handles one delivery for `category`.
    ///
    /// Acknowledgment happens before the blocking check and before the
    /// counter increment: once a message is acked it will never be
    /// redelivered, even if the outcome notification later fails. An
    /// over-limit message is never acknowledged; the broker redelivers it
    /// after the next connection recycle.
    pub async fn on_message(
        &self,
        category: Category,
        payload: &[u8],
        ack: &dyn DeliveryAck,
    ) -> Disposition {
        let queue = category.queue_name();

        let (progress, max_per_minute) = {
            let mut state = self.state(category).lock();
            if state.window.processed >= state.settings.max_per_minute {
                debug!(
                    queue,
                    "Maximum message count reached. Pausing processing until reset."
                );
                state.window.allowed = false;
                return Disposition::Throttled;
            }
            (state.window.processed + 1, state.settings.max_per_minute)
        };

        let body: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(body) => body,
            Err(e) => {
                error!(queue, error = %e, "Discarding malformed message body");
                ack.ack().await;
                return Disposition::Dropped;
            }
        };
        debug!(queue, "Processing message: {body} [{progress}/{max_per_minute}]");
        ack.ack().await;

        let Some(id) = extract_entity_id(category, &body) else {
            error!(
                queue,
                field = category.id_field(),
                "Message is missing its entity id, dropping"
            );
            return Disposition::Dropped;
        };

        // Whoever removes the record first owns the notification; a blocked
        // record means a manual update already sent one.
        if self.records(category).consume_if_present(&id) {
            debug!(queue, id = %id, "Entity was manually updated, skipping automatic outcome");
            return Disposition::Suppressed;
        }

        let processing_time_secs = {
            let mut state = self.state(category).lock();
            state.window.processed += 1;
            state.settings.processing_time_secs
        };
        let delay_secs = if processing_time_secs == 0 {
            0
        } else {
            self.rng.lock().gen_range(0..processing_time_secs)
        };
        info!(queue, id = %id, "Sending event update after [{delay_secs}]s");
        self.schedule_outcome(category, id, Duration::from_secs(delay_secs));
        Disposition::Scheduled
    }

    /// After `delay`, draws the outcome against the then-current success
    /// rate and reports it. There is no cancellation: once scheduled, the
    /// outcome fires.
    fn schedule_outcome(&self, category: Category, id: String, delay: Duration) {
        let state = self.state(category).clone();
        let notifier = self.notifier.clone();
        let rng = self.rng.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let success_rate = state.lock().settings.success_rate;
            let successful = rng.lock().gen::<f64>() < success_rate;
            let update = match category {
                Category::Payment => OutcomeUpdate::Payment {
                    payment_id: id,
                    status: if successful {
                        PaymentStatus::Succeeded
                    } else {
                        PaymentStatus::Failed
                    },
                },
                Category::Shipment => OutcomeUpdate::Shipment {
                    shipment_id: id,
                    status: if successful {
                        ShipmentStatus::Delivered
                    } else {
                        ShipmentStatus::Failed
                    },
                },
            };
            notifier.send_outcome(&update).await;
        });
    }

    /// Resets every category's window. Returns whether any category had
    /// paused with a positive limit, in which case the caller must recycle
    /// the broker connection so the unacknowledged backlog is redelivered.
    pub fn reset_windows(&self) -> bool {
        debug!("Resetting message counts.");
        let mut needs_reconnect = false;
        for category in Category::ALL {
            let mut state = self.state(category).lock();
            if !state.window.allowed && state.settings.max_per_minute > 0 {
                needs_reconnect = true;
            }
            state.window.processed = 0;
            state.window.allowed = true;
        }
        needs_reconnect
    }
}
