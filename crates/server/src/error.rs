use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::DomainError;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data: Some(data),
        error: None,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Domain(err) => match err {
                DomainError::PermissionDenied => StatusCode::FORBIDDEN,
                DomainError::OverBudget | DomainError::InvalidAmount => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                DomainError::InvalidTransition(_)
                | DomainError::Conflict(_)
                | DomainError::AlreadyResolved => StatusCode::CONFLICT,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details go to the log, never over the wire.
        let message = match &self {
            AppError::Database(err) => {
                tracing::error!("database error: {err}");
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(Envelope::<()> {
            success: false,
            data: None,
            error: Some(message),
        });

        (status, body).into_response()
    }
}
