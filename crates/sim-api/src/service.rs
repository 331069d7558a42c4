//! Registration and manual-update orchestration for one category.

use std::sync::Arc;

use tracing::info;

use sim_broker::QueuePublisher;
use sim_common::{OutcomeUpdate, TrackedEntity};
use sim_connector::OutcomeNotifier;
use sim_records::RecordStore;

use crate::error::ServiceError;

/// Collaborator-facing operations on one category's entities. Registration
/// tracks the entity and enqueues its processing event; a manual update
/// blocks the entity and reports the operator-chosen outcome directly,
/// bypassing the engine.
pub struct EntityService {
    records: Arc<RecordStore>,
    notifier: Arc<dyn OutcomeNotifier>,
    publisher: Arc<dyn QueuePublisher>,
}

impl EntityService {
    pub fn new(
        records: Arc<RecordStore>,
        notifier: Arc<dyn OutcomeNotifier>,
        publisher: Arc<dyn QueuePublisher>,
    ) -> Self {
        Self {
            records,
            notifier,
            publisher,
        }
    }

    /// Tracks the entity (unblocked) and publishes its registration event
    /// to the category queue.
    pub async fn register(&self, id: &str) -> Result<(), ServiceError> {
        let category = self.records.category();
        info!(category = %category, id = %id, "Registering entity");
        self.records.create(TrackedEntity::new(id, category));

        let mut body = serde_json::Map::new();
        body.insert(
            category.id_field().to_string(),
            serde_json::Value::String(id.to_string()),
        );
        let payload = serde_json::to_vec(&serde_json::Value::Object(body))?;
        self.publisher.publish(category.queue_name(), &payload).await?;
        Ok(())
    }

    /// Blocks the entity against automatic resolution and sends the manual
    /// outcome. Fails with `NotFound` when the entity is unknown.
    pub async fn manual_update(&self, update: OutcomeUpdate) -> Result<(), ServiceError> {
        let category = self.records.category();
        let id = update.entity_id().to_string();
        info!(
            category = %category,
            id = %id,
            status = %update.status_label(),
            "Manually updating entity"
        );
        if self.records.mark_blocked(&id).is_none() {
            return Err(ServiceError::NotFound { category, id });
        }
        self.notifier.send_outcome(&update).await;
        Ok(())
    }

    pub fn find_all(&self) -> Vec<TrackedEntity> {
        self.records.find_all()
    }
}
