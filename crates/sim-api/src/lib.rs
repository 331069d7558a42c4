//! REST surface for the simulation.
//!
//! Endpoints:
//! - Registration and manual updates per category
//! - Sidecar configuration (`/ecs/*`)
//! - Health check and OpenAPI document

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use utoipa::OpenApi;

use sim_common::OutcomeUpdate;
use sim_config::{ConfigStore, VariableSnapshot};

pub mod error;
pub mod model;
pub mod service;

pub use error::{ApiError, AppError, ServiceError};
pub use service::EntityService;

use model::{
    EntityResponse, HealthResponse, RegisterPaymentRequest, RegisterShipmentRequest,
    SuccessResponse, UpdatePaymentRequest, UpdateShipmentRequest,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub payments: Arc<EntityService>,
    pub shipments: Arc<EntityService>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SimCast API",
        description = "Registration, manual updates and runtime configuration for the event simulation"
    ),
    components(schemas(
        RegisterPaymentRequest,
        RegisterShipmentRequest,
        UpdatePaymentRequest,
        UpdateShipmentRequest,
        EntityResponse,
        SuccessResponse,
        HealthResponse,
        ApiError,
    ))
)]
struct ApiDoc;

/// Create the full router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/payment/register", post(register_payment))
        .route("/payment/update", post(update_payment))
        .route("/payment", get(list_payments))
        .route("/shipment/register", post(register_shipment))
        .route("/shipment/update", post(update_shipment))
        .route("/shipment", get(list_shipments))
        .route("/ecs/defined-variables", get(defined_variables))
        .route("/ecs/variables", post(set_variables))
        .route("/health", get(health))
        .route("/openapi.json", get(openapi_document))
        .with_state(state)
}

async fn register_payment(
    State(state): State<AppState>,
    Json(request): Json<RegisterPaymentRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.payments.register(&request.payment_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn update_payment(
    State(state): State<AppState>,
    Json(request): Json<UpdatePaymentRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .payments
        .manual_update(OutcomeUpdate::Payment {
            payment_id: request.payment_id,
            status: request.status,
        })
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn list_payments(State(state): State<AppState>) -> Json<Vec<EntityResponse>> {
    Json(
        state
            .payments
            .find_all()
            .into_iter()
            .map(EntityResponse::from)
            .collect(),
    )
}

async fn register_shipment(
    State(state): State<AppState>,
    Json(request): Json<RegisterShipmentRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.shipments.register(&request.shipment_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn update_shipment(
    State(state): State<AppState>,
    Json(request): Json<UpdateShipmentRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .shipments
        .manual_update(OutcomeUpdate::Shipment {
            shipment_id: request.shipment_id,
            status: request.status,
        })
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn list_shipments(State(state): State<AppState>) -> Json<Vec<EntityResponse>> {
    Json(
        state
            .shipments
            .find_all()
            .into_iter()
            .map(EntityResponse::from)
            .collect(),
    )
}

async fn defined_variables(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, VariableSnapshot>> {
    Json(state.config.defined_variable_snapshot())
}

async fn set_variables(
    State(state): State<AppState>,
    Json(updates): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.config.set_variables(&updates)?;
    Ok(Json(SuccessResponse::ok()))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
