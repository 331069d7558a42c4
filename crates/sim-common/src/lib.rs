use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

// ============================================================================
// Entity Categories
// ============================================================================

/// The two kinds of entities flowing through the simulation. Each category
/// has its own durable queue, its own record store and its own set of
/// configuration variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Payment,
    Shipment,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Payment, Category::Shipment];

    /// Durable queue the category's registration events arrive on.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Category::Payment => "payments-queue",
            Category::Shipment => "shipments-queue",
        }
    }

    /// JSON field carrying the entity id in queue messages and updates.
    pub fn id_field(&self) -> &'static str {
        match self {
            Category::Payment => "paymentId",
            Category::Shipment => "shipmentId",
        }
    }

    /// Configuration key for the per-minute processing limit.
    pub fn per_minute_key(&self) -> &'static str {
        match self {
            Category::Payment => "PAYMENTS_PER_MINUTE",
            Category::Shipment => "SHIPMENTS_PER_MINUTE",
        }
    }

    /// Configuration key for the simulated processing time (seconds).
    pub fn processing_time_key(&self) -> &'static str {
        match self {
            Category::Payment => "PAYMENT_PROCESSING_TIME",
            Category::Shipment => "SHIPMENT_PROCESSING_TIME",
        }
    }

    /// Configuration key for the success probability of the outcome draw.
    pub fn success_rate_key(&self) -> &'static str {
        match self {
            Category::Payment => "PAYMENT_SUCCESS_RATE",
            Category::Shipment => "SHIPMENT_SUCCESS_RATE",
        }
    }

    /// Configuration/environment key holding the downstream service URL.
    pub fn endpoint_key(&self) -> &'static str {
        match self {
            Category::Payment => "PAYMENT_URL",
            Category::Shipment => "SHIPMENT_URL",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Payment => write!(f, "payment"),
            Category::Shipment => write!(f, "shipment"),
        }
    }
}

// ============================================================================
// Terminal and intermediate statuses
// ============================================================================

/// Status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created but not yet processed.
    Open,
    /// Currently being processed.
    Pending,
    /// Successfully processed.
    Succeeded,
    /// Processing failed indefinitely.
    Failed,
    /// Sold to an external collections service.
    Inkasso,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentStatus::Open => "OPEN",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Inkasso => "INKASSO",
        };
        write!(f, "{label}")
    }
}

/// Status of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    InProgress,
    Delivered,
    Failed,
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::InProgress => "IN_PROGRESS",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::Failed => "FAILED",
        };
        write!(f, "{label}")
    }
}

// ============================================================================
// Tracked entities
// ============================================================================

/// In-memory record of an entity awaiting resolution. Created at
/// registration, removed by the automatic path, or marked blocked by a
/// manual update.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub id: String,
    pub category: Category,
    pub blocked: bool,
    pub registered_at: DateTime<Utc>,
}

impl TrackedEntity {
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            category,
            blocked: false,
            registered_at: Utc::now(),
        }
    }
}

// ============================================================================
// Outcome updates
// ============================================================================

/// A terminal status for an entity, reported downstream exactly once per
/// entity (by either the automatic or the manual path).
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeUpdate {
    Payment {
        payment_id: String,
        status: PaymentStatus,
    },
    Shipment {
        shipment_id: String,
        status: ShipmentStatus,
    },
}

impl OutcomeUpdate {
    pub fn category(&self) -> Category {
        match self {
            OutcomeUpdate::Payment { .. } => Category::Payment,
            OutcomeUpdate::Shipment { .. } => Category::Shipment,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            OutcomeUpdate::Payment { payment_id, .. } => payment_id,
            OutcomeUpdate::Shipment { shipment_id, .. } => shipment_id,
        }
    }

    pub fn status_label(&self) -> String {
        match self {
            OutcomeUpdate::Payment { status, .. } => status.to_string(),
            OutcomeUpdate::Shipment { status, .. } => status.to_string(),
        }
    }
}

// ============================================================================
// Queue events
// ============================================================================

/// Extracts the entity id from a queue message body, honoring the
/// category-specific field name.
pub fn extract_entity_id(category: Category, body: &serde_json::Value) -> Option<String> {
    body.get(category.id_field())
        .and_then(|value| value.as_str())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_category_queue_mapping() {
        assert_eq!(Category::Payment.queue_name(), "payments-queue");
        assert_eq!(Category::Shipment.queue_name(), "shipments-queue");
        assert_eq!(Category::Payment.id_field(), "paymentId");
        assert_eq!(Category::Shipment.id_field(), "shipmentId");
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(PaymentStatus::Succeeded).unwrap(),
            json!("SUCCEEDED")
        );
        assert_eq!(
            serde_json::to_value(ShipmentStatus::InProgress).unwrap(),
            json!("IN_PROGRESS")
        );
        let status: PaymentStatus = serde_json::from_value(json!("INKASSO")).unwrap();
        assert_eq!(status, PaymentStatus::Inkasso);
    }

    #[test]
    fn test_new_entity_is_unblocked() {
        let id = Uuid::new_v4().to_string();
        let entity = TrackedEntity::new(id.clone(), Category::Payment);
        assert_eq!(entity.id, id);
        assert!(!entity.blocked);
    }

    #[test]
    fn test_extract_entity_id_per_category() {
        let body = json!({ "paymentId": "p-1", "amount": 100 });
        assert_eq!(
            extract_entity_id(Category::Payment, &body),
            Some("p-1".to_string())
        );
        assert_eq!(extract_entity_id(Category::Shipment, &body), None);
    }

    #[test]
    fn test_outcome_update_accessors() {
        let update = OutcomeUpdate::Shipment {
            shipment_id: "s-1".to_string(),
            status: ShipmentStatus::Delivered,
        };
        assert_eq!(update.category(), Category::Shipment);
        assert_eq!(update.entity_id(), "s-1");
        assert_eq!(update.status_label(), "DELIVERED");
    }
}
