//! Shared API types
//!
//! Error handling common to all endpoints. Every rejection is logged before
//! it becomes a response.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dataplane::InvalidDataError;

use crate::data::DataError;

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    Forbidden { code: String, message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<InvalidDataError> for ApiError {
    fn from(e: InvalidDataError) -> Self {
        let code = if e.is_remote() {
            "REMOTE_TABLE_ERROR"
        } else {
            "INVALID_DATA"
        };
        Self::bad_request(code, e.to_string())
    }
}

impl From<DataError> for ApiError {
    fn from(e: DataError) -> Self {
        match e {
            DataError::TableNotFound { .. } => Self::bad_request("TABLE_NOT_FOUND", e.to_string()),
            DataError::TableNotAuthorized { .. } => {
                Self::forbidden("TABLE_NOT_AUTHORIZED", e.to_string())
            }
            DataError::ColumnNotFound { .. } => {
                Self::bad_request("COLUMN_NOT_FOUND", e.to_string())
            }
            other => {
                tracing::error!(error = %other, "Data error");
                Self::internal("Table operation failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::Forbidden { code, message } => {
                (StatusCode::FORBIDDEN, "forbidden", code, message)
            }
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
            ),
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), code = %code, message = %message, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), code = %code, message = %message, "Request rejected");
        }
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{Value, json};

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_data_is_bad_request() {
        let err: ApiError = InvalidDataError::unknown_column("height").into();
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "error": "bad_request",
                "code": "INVALID_DATA",
                "message": "height is not a valid column name"
            })
        );
    }

    #[tokio::test]
    async fn test_data_error_statuses() {
        let (status, body) = render(
            DataError::TableNotAuthorized {
                table: "people".to_string(),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "TABLE_NOT_AUTHORIZED");

        let (status, _) = render(
            DataError::TableNotFound {
                table: "people".to_string(),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = render(DataError::invalid_file("/x.csv", "broken").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Table operation failed");
    }
}
