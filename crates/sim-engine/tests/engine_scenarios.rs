//! End-to-end engine scenarios: rate limiting, window reset, outcome draws,
//! and the race between the automatic and the manual resolution path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use sim_broker::DeliveryAck;
use sim_common::{Category, OutcomeUpdate, PaymentStatus, ShipmentStatus, TrackedEntity};
use sim_config::ConfigStore;
use sim_connector::{NotifyResult, OutcomeNotifier};
use sim_engine::{Disposition, EventProcessingEngine};
use sim_records::RecordStore;

#[derive(Default)]
struct TestAck {
    acked: AtomicBool,
}

#[async_trait]
impl DeliveryAck for TestAck {
    async fn ack(&self) {
        self.acked.store(true, Ordering::SeqCst);
    }
}

impl TestAck {
    fn was_acked(&self) -> bool {
        self.acked.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<OutcomeUpdate>>,
}

#[async_trait]
impl OutcomeNotifier for RecordingNotifier {
    async fn send_outcome(&self, update: &OutcomeUpdate) -> NotifyResult {
        self.sent.lock().push(update.clone());
        NotifyResult::Delivered
    }
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<OutcomeUpdate> {
        self.sent.lock().clone()
    }
}

struct Harness {
    config: Arc<ConfigStore>,
    payments: Arc<RecordStore>,
    shipments: Arc<RecordStore>,
    notifier: Arc<RecordingNotifier>,
    engine: EventProcessingEngine,
}

fn harness(seed: u64) -> Harness {
    let config = Arc::new(ConfigStore::with_env(HashMap::new()).unwrap());
    let payments = Arc::new(RecordStore::new(Category::Payment));
    let shipments = Arc::new(RecordStore::new(Category::Shipment));
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = EventProcessingEngine::with_seed(
        config.clone(),
        payments.clone(),
        shipments.clone(),
        notifier.clone(),
        seed,
    );
    engine.refresh_settings();
    Harness {
        config,
        payments,
        shipments,
        notifier,
        engine,
    }
}

impl Harness {
    fn set(&self, updates: serde_json::Value) {
        self.config
            .set_variables(updates.as_object().unwrap())
            .unwrap();
        self.engine.refresh_settings();
    }

    fn register_payment(&self, id: &str) {
        self.payments
            .create(TrackedEntity::new(id, Category::Payment));
    }

    async fn deliver_payment(&self, id: &str) -> (Disposition, bool) {
        let ack = TestAck::default();
        let payload = serde_json::to_vec(&json!({ "paymentId": id })).unwrap();
        let disposition = self
            .engine
            .on_message(Category::Payment, &payload, &ack)
            .await;
        (disposition, ack.was_acked())
    }

    async fn deliver_shipment(&self, id: &str) -> (Disposition, bool) {
        let ack = TestAck::default();
        let payload = serde_json::to_vec(&json!({ "shipmentId": id })).unwrap();
        let disposition = self
            .engine
            .on_message(Category::Shipment, &payload, &ack)
            .await;
        (disposition, ack.was_acked())
    }
}

/// Lets every scheduled outcome (delay < 6s with default settings) fire
/// under the paused clock.
async fn drain_outcomes() {
    tokio::time::sleep(Duration::from_secs(6)).await;
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_pauses_third_payment() {
    let h = harness(42);
    h.set(json!({ "PAYMENTS_PER_MINUTE": "2" }));
    for id in ["P1", "P2", "P3"] {
        h.register_payment(id);
    }

    assert_eq!(h.deliver_payment("P1").await, (Disposition::Scheduled, true));
    assert_eq!(h.deliver_payment("P2").await, (Disposition::Scheduled, true));
    // The third delivery exceeds the window: no ack, no processing.
    assert_eq!(
        h.deliver_payment("P3").await,
        (Disposition::Throttled, false)
    );

    let window = h.engine.window(Category::Payment);
    assert_eq!(window.processed, 2);
    assert!(!window.allowed);

    drain_outcomes().await;
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    for update in &sent {
        assert!(matches!(
            update,
            OutcomeUpdate::Payment {
                status: PaymentStatus::Succeeded | PaymentStatus::Failed,
                ..
            }
        ));
    }
    // P3 is still tracked; it was never consumed.
    assert!(h.payments.find_by_id("P3").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_window_reset_flags_reconnect_and_redelivers() {
    let h = harness(42);
    h.set(json!({ "PAYMENTS_PER_MINUTE": "2" }));
    for id in ["P1", "P2", "P3"] {
        h.register_payment(id);
    }
    h.deliver_payment("P1").await;
    h.deliver_payment("P2").await;
    h.deliver_payment("P3").await;

    // The paused category (max > 0) forces a connection recycle.
    assert!(h.engine.reset_windows());
    let window = h.engine.window(Category::Payment);
    assert_eq!(window.processed, 0);
    assert!(window.allowed);

    // The broker redelivers P3 into the fresh window.
    assert_eq!(h.deliver_payment("P3").await, (Disposition::Scheduled, true));

    drain_outcomes().await;
    assert_eq!(h.notifier.sent().len(), 3);

    // Nothing pending anymore: the next reset needs no reconnect.
    assert!(!h.engine.reset_windows());
}

#[tokio::test(start_paused = true)]
async fn test_full_success_rate_always_succeeds() {
    let h = harness(7);
    h.set(json!({ "PAYMENT_SUCCESS_RATE": "1.0" }));

    for i in 0..10 {
        let id = format!("P{i}");
        h.register_payment(&id);
        h.deliver_payment(&id).await;
    }
    drain_outcomes().await;

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 10);
    for update in &sent {
        assert!(matches!(
            update,
            OutcomeUpdate::Payment {
                status: PaymentStatus::Succeeded,
                ..
            }
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_success_rate_always_fails() {
    let h = harness(7);
    h.set(json!({ "SHIPMENT_SUCCESS_RATE": "0.0" }));

    h.shipments
        .create(TrackedEntity::new("S1", Category::Shipment));
    h.deliver_shipment("S1").await;
    drain_outcomes().await;

    assert_eq!(
        h.notifier.sent(),
        vec![OutcomeUpdate::Shipment {
            shipment_id: "S1".to_string(),
            status: ShipmentStatus::Failed,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_update_suppresses_automatic_outcome() {
    let h = harness(42);
    h.register_payment("P5");

    // Manual path: block the entity, then notify directly.
    h.payments.mark_blocked("P5").unwrap();
    h.notifier
        .send_outcome(&OutcomeUpdate::Payment {
            payment_id: "P5".to_string(),
            status: PaymentStatus::Inkasso,
        })
        .await;

    // The automatic path still acks, but sends nothing.
    assert_eq!(
        h.deliver_payment("P5").await,
        (Disposition::Suppressed, true)
    );
    drain_outcomes().await;

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0],
        OutcomeUpdate::Payment {
            payment_id: "P5".to_string(),
            status: PaymentStatus::Inkasso,
        }
    );
    // A blocked entity does not consume a window slot.
    assert_eq!(h.engine.window(Category::Payment).processed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_limit_throttles_immediately() {
    let h = harness(42);
    h.set(json!({ "SHIPMENTS_PER_MINUTE": "0" }));
    h.shipments
        .create(TrackedEntity::new("S1", Category::Shipment));

    assert_eq!(
        h.deliver_shipment("S1").await,
        (Disposition::Throttled, false)
    );
    assert!(!h.engine.window(Category::Shipment).allowed);

    // A zero limit never forces a reconnect: there is no window to reopen.
    assert!(!h.engine.reset_windows());

    // Raising the limit again lets messages through.
    h.set(json!({ "SHIPMENTS_PER_MINUTE": "10" }));
    assert_eq!(
        h.deliver_shipment("S1").await,
        (Disposition::Scheduled, true)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_entity_fails_open() {
    let h = harness(42);
    // Never registered (e.g. lost across a restart): processing proceeds.
    assert_eq!(
        h.deliver_payment("GHOST").await,
        (Disposition::Scheduled, true)
    );
    drain_outcomes().await;
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_missing_id_field_is_dropped_after_ack() {
    let h = harness(42);
    let ack = TestAck::default();
    let payload = serde_json::to_vec(&json!({ "amount": 100 })).unwrap();
    let disposition = h
        .engine
        .on_message(Category::Payment, &payload, &ack)
        .await;
    assert_eq!(disposition, Disposition::Dropped);
    assert!(ack.was_acked());
}

#[tokio::test]
async fn test_malformed_body_is_dropped_after_ack() {
    let h = harness(42);
    let ack = TestAck::default();
    let disposition = h
        .engine
        .on_message(Category::Payment, b"not json", &ack)
        .await;
    assert_eq!(disposition, Disposition::Dropped);
    assert!(ack.was_acked());
}

#[tokio::test]
async fn test_refresh_picks_up_variable_changes() {
    let h = harness(42);
    h.set(json!({
        "PAYMENT_PROCESSING_TIME": "9",
        "PAYMENT_SUCCESS_RATE": "0.25",
        "PAYMENTS_PER_MINUTE": "3"
    }));

    let settings = h.engine.settings(Category::Payment);
    assert_eq!(settings.max_per_minute, 3);
    assert_eq!(settings.processing_time_secs, 9);
    assert_eq!(settings.success_rate, 0.25);

    // The other category keeps its defaults.
    let shipment = h.engine.settings(Category::Shipment);
    assert_eq!(shipment.processing_time_secs, 5);
}
