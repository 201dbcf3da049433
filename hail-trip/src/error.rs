use hail_core::repository::StoreError;
use hail_core::CoreError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TripError {
    #[error("Trip not found: {0}")]
    NotFound(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TripError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TripError::NotFound(_) => "not_found",
            TripError::Forbidden(_) => "forbidden",
            TripError::InvalidState(_) => "invalid_state",
            TripError::Conflict(_) => "conflict",
            TripError::Validation(_) => "validation",
            TripError::UpstreamUnavailable(_) => "upstream_unavailable",
            TripError::Storage(_) => "storage",
        }
    }
}

impl From<StoreError> for TripError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => TripError::Conflict(msg),
            StoreError::Backend(e) => TripError::Storage(e.to_string()),
        }
    }
}

impl From<CoreError> for TripError {
    fn from(err: CoreError) -> Self {
        TripError::Validation(err.to_string())
    }
}

pub type TripResult<T> = Result<T, TripError>;
