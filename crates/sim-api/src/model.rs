//! Wire DTOs for the REST surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use sim_common::{PaymentStatus, ShipmentStatus, TrackedEntity};

/// Registration request for a payment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPaymentRequest {
    pub payment_id: String,
    pub amount: i64,
    pub payment_type: String,
}

/// Registration request for a shipment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterShipmentRequest {
    pub shipment_id: String,
}

/// Manual status override for a payment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub payment_id: String,
    pub status: PaymentStatus,
}

/// Manual status override for a shipment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShipmentRequest {
    pub shipment_id: String,
    pub status: ShipmentStatus,
}

/// A tracked entity as listed by the API.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityResponse {
    pub id: String,
    pub blocked: bool,
    pub registered_at: String,
}

impl From<TrackedEntity> for EntityResponse {
    fn from(entity: TrackedEntity) -> Self {
        Self {
            id: entity.id,
            blocked: entity.blocked,
            registered_at: entity.registered_at.to_rfc3339(),
        }
    }
}

/// Generic success envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Health check body.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
