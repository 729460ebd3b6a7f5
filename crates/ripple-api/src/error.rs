use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use ripple_db::StoreError;

/// HTTP-facing failure. Store errors carry their kind through to the
/// response; anything else collapses to an opaque 500 with the detail
/// logged, not leaked.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Store(StoreError::Unauthorized)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            Self::Store(StoreError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string())
            }
            Self::Store(StoreError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            Self::Store(StoreError::Conflict(_)) => {
                (StatusCode::CONFLICT, "conflict", self.to_string())
            }
            Self::Store(StoreError::Validation(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation", self.to_string())
            }
            other => {
                error!("internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_kinds_map_to_expected_statuses() {
        let cases = [
            (StoreError::Unauthorized, StatusCode::UNAUTHORIZED),
            (StoreError::NotFound("chat"), StatusCode::NOT_FOUND),
            (
                StoreError::Conflict("username taken".into()),
                StatusCode::CONFLICT,
            ),
            (
                StoreError::Validation("empty".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                StoreError::CounterCorruption("follower_count".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
