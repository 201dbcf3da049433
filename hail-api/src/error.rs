use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hail_trip::TripError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UpstreamError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UpstreamError(msg) => {
                tracing::warn!("Upstream unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<TripError> for AppError {
    fn from(err: TripError) -> Self {
        let message = err.to_string();
        match err {
            TripError::NotFound(_) => AppError::NotFoundError(message),
            TripError::Forbidden(_) => AppError::AuthorizationError(message),
            TripError::InvalidState(_) | TripError::Conflict(_) => AppError::ConflictError(message),
            TripError::Validation(_) => AppError::ValidationError(message),
            TripError::UpstreamUnavailable(_) => AppError::UpstreamError(message),
            TripError::Storage(_) => AppError::InternalServerError(message),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_trip_errors_map_to_status_codes() {
        let cases = [
            (TripError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (TripError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (TripError::InvalidState("x".into()), StatusCode::CONFLICT),
            (TripError::Conflict("x".into()), StatusCode::CONFLICT),
            (TripError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (TripError::UpstreamUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (TripError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
