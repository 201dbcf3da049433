pub mod identity;
pub mod notify;
pub mod proximity;
pub mod repository;
pub mod trip;

pub use identity::{AuthUser, Role};
pub use trip::{Rating, RejectionReason, RejectionRecord, Trip, TripStatus, TripView};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Unknown trip status: {0}")]
    UnknownStatus(String),
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}
