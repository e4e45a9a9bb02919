use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("recognition provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("malformed provider response: {0}")]
    ResponseMalformed(String),

    #[error("model refused the request: {0}")]
    ModelRefused(String),

    #[error("provider content filter triggered")]
    ContentFiltered,

    #[error("model output was truncated")]
    TruncatedOutput,

    #[error("database error: {0}")]
    Persistence(sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound,
            other => AppError::Persistence(other),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::ResponseMalformed(_)
            | AppError::ModelRefused(_)
            | AppError::ContentFiltered
            | AppError::TruncatedOutput => StatusCode::BAD_GATEWAY,
            AppError::Persistence(_) | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
            _ => self.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn provider_errors_map_to_bad_gateway() {
        for err in [
            AppError::ProviderUnavailable("timeout".into()),
            AppError::TruncatedOutput,
            AppError::ContentFiltered,
            AppError::ModelRefused("no".into()),
            AppError::ResponseMalformed("bad json".into()),
        ] {
            assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        }
    }
}
