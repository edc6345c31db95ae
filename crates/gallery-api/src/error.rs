use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("image not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The identity provider could not be reached or answered garbage
    #[error("identity provider error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Unauthorized(reason) => {
                tracing::debug!("Rejected bearer token: {}", reason);
                (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, "Bearer error=\"invalid_token\"")],
                )
                    .into_response()
            }
            ApiError::Forbidden(reason) => {
                tracing::info!("Access denied: {}", reason);
                StatusCode::FORBIDDEN.into_response()
            }
            ApiError::NotFound | ApiError::Repository(RepositoryError::NotFound(_)) => {
                StatusCode::NOT_FOUND.into_response()
            }
            ApiError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response()
            }
            ApiError::Upstream(reason) => {
                tracing::error!("Identity provider failure: {}", reason);
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            }
            ApiError::Repository(e) => {
                tracing::error!("Repository failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
