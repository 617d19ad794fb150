//! HTTP error mapping for the Tannoy server.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tannoy_core::ChannelError;
use thiserror::Error;

/// Errors a handler can answer with, each carrying its HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request arguments cannot be honored.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The addressed channel or player document does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The store behind the engine is unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ChannelError> for ApiError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::ChannelNotFound(_) | ChannelError::PlayerChannelNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            ChannelError::InvalidArgument(message) => ApiError::BadRequest(message.to_string()),
            ChannelError::Store(source) => ApiError::ServiceUnavailable(source.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tannoy_core::StoreError;

    #[test]
    fn test_channel_errors_map_to_statuses() {
        let cases = [
            (
                ChannelError::ChannelNotFound("area:1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ChannelError::PlayerChannelNotFound("p1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ChannelError::InvalidArgument("bad combination"),
                StatusCode::BAD_REQUEST,
            ),
            (
                ChannelError::Store(StoreError::Backend("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
