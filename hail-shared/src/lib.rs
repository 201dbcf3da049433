pub mod geo;
pub mod models;
pub mod pii;

pub use geo::{Coordinates, DistanceUnit};
pub use models::events::{Notification, TripEventKind};
pub use pii::Masked;

/// Numeric user id issued by the identity service. Passengers and drivers
/// share the same id space.
pub type UserId = i64;
