//! API error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use sim_broker::BrokerError;
use sim_common::Category;
use sim_config::ConfigError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{category} {id} not found")]
    NotFound { category: Category, id: String },

    #[error("queue publish failed: {0}")]
    Publish(#[from] BrokerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error body returned to API callers.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

/// Everything a handler can fail with, mapped onto a status code and an
/// [`ApiError`] body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Service(ServiceError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            AppError::Service(ServiceError::Publish(_)) => {
                (StatusCode::BAD_GATEWAY, "QUEUE_UNAVAILABLE")
            }
            AppError::Service(ServiceError::Serialization(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
            AppError::Config(
                ConfigError::UnknownVariable { .. }
                | ConfigError::InvalidValue { .. }
                | ConfigError::UnsupportedType { .. },
            ) => (StatusCode::BAD_REQUEST, "INVALID_VARIABLE"),
            AppError::Config(ConfigError::MissingDefault { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        };
        let body = ApiError {
            error: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
