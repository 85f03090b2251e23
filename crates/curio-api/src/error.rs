//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

/// API-level error, mapped onto an HTTP status and a JSON body.
#[derive(Debug)]
pub enum ApiError {
    Internal(curio_core::Error),
    NotFound(String),
    BadRequest(String),
    /// A required backend (the encoder) is degraded.
    Unavailable(String),
}

impl From<curio_core::Error> for ApiError {
    fn from(err: curio_core::Error) -> Self {
        use curio_core::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::ItemNotFound(id) => ApiError::NotFound(format!("item {}", id)),
            Error::SessionNotFound(id) => ApiError::NotFound(format!("session {}", id)),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Encoding(msg) => ApiError::Unavailable(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(serde_json::json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_not_found_variants_map_to_404() {
        let err: ApiError = curio_core::Error::ItemNotFound(Uuid::nil()).into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError = curio_core::Error::SessionNotFound(Uuid::nil()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_invalid_input_maps_to_400() {
        let err: ApiError = curio_core::Error::InvalidInput("bad".into()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_encoding_maps_to_503() {
        let err: ApiError = curio_core::Error::Encoding("no credentials".into()).into();
        assert!(matches!(err, ApiError::Unavailable(_)));
    }

    #[test]
    fn test_response_carries_json_error_body() {
        let response = ApiError::NotFound("item x".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
