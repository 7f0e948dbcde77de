use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use log::{error, warn};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Failure talking to the external token or catalog provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("no access token has been obtained yet")]
    NoCredential,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    DuplicateKey(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Auth(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(StoreError),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(id) => {
                AppError::DuplicateKey(format!("a track with id {} already exists", id))
            }
            StoreError::Validation(e) => AppError::Validation(e.0),
            other => AppError::Store(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::DuplicateKey(_) | AppError::Upstream(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Upstream(_) => {
                "The request is invalid. Check that the information provided is valid and complete.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}: {}", status, self);
        } else {
            warn!("{}: {}", status, self);
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: status.as_u16().to_string(),
                message: self.public_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// JSON body extractor whose rejections use the structured error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ValidationError;

    #[test]
    fn store_errors_map_to_client_and_server_statuses() {
        let duplicate = AppError::from(StoreError::DuplicateKey("t1".to_string()));
        assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

        let invalid = AppError::from(StoreError::Validation(ValidationError("bad".to_string())));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.to_string(), "bad");

        let broken = AppError::from(StoreError::Database(sea_orm::DbErr::Custom("gone".to_string())));
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(broken.to_string().contains("gone"));
    }

    #[test]
    fn upstream_failures_hide_the_cause() {
        let err = AppError::from(UpstreamError::Status(reqwest::StatusCode::UNAUTHORIZED));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(!err.public_message().contains("401"));
    }
}
