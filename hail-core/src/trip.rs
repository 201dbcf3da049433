use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use hail_shared::{Coordinates, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Trip status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Searching,
    DriverFound,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Searching => "SEARCHING",
            TripStatus::DriverFound => "DRIVER_FOUND",
            TripStatus::Accepted => "ACCEPTED",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    /// COMPLETED and CANCELLED trips are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    /// Statuses in which the trip must carry a driver id.
    pub fn requires_driver(&self) -> bool {
        matches!(
            self,
            TripStatus::DriverFound | TripStatus::Accepted | TripStatus::InProgress | TripStatus::Completed
        )
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEARCHING" => Ok(TripStatus::Searching),
            "DRIVER_FOUND" => Ok(TripStatus::DriverFound),
            "ACCEPTED" => Ok(TripStatus::Accepted),
            "IN_PROGRESS" => Ok(TripStatus::InProgress),
            "COMPLETED" => Ok(TripStatus::Completed),
            "CANCELLED" => Ok(TripStatus::Cancelled),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// A passenger's ride from pickup to dropoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub passenger_id: UserId,
    pub driver_id: Option<UserId>,
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
    pub status: TripStatus,
    pub price_estimate: Decimal,
    /// Deadline for the assigned driver to respond. Only set in DRIVER_FOUND.
    pub assignment_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    /// New trip in SEARCHING with no driver.
    pub fn new(passenger_id: UserId, pickup: Coordinates, dropoff: Coordinates, price_estimate: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            passenger_id,
            driver_id: None,
            pickup,
            dropoff,
            status: TripStatus::Searching,
            price_estimate,
            assignment_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Driver presence and assignment deadline agree with the status.
    pub fn is_consistent(&self) -> bool {
        self.driver_id.is_some() == self.status.requires_driver()
            && self.assignment_expires_at.is_some() == (self.status == TripStatus::DriverFound)
    }

    pub fn is_assigned_to(&self, driver_id: UserId) -> bool {
        self.driver_id == Some(driver_id)
    }
}

/// Why a driver was excluded from a trip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    Rejected,
    TimedOut,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Rejected => "REJECTED",
            RejectionReason::TimedOut => "TIMED_OUT",
        }
    }
}

impl FromStr for RejectionReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REJECTED" => Ok(RejectionReason::Rejected),
            "TIMED_OUT" => Ok(RejectionReason::TimedOut),
            other => Err(CoreError::ValidationError(format!("unknown rejection reason {}", other))),
        }
    }
}

/// A driver that declined (or let expire) an offer for a trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectionRecord {
    pub trip_id: Uuid,
    pub driver_id: UserId,
    pub reason: RejectionReason,
    pub created_at: DateTime<Utc>,
}

impl RejectionRecord {
    pub fn new(trip_id: Uuid, driver_id: UserId, reason: RejectionReason) -> Self {
        Self {
            trip_id,
            driver_id,
            reason,
            created_at: Utc::now(),
        }
    }
}

/// Passenger feedback for a completed trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub passenger_id: UserId,
    pub driver_id: UserId,
    pub score: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub const MIN_SCORE: i16 = 1;
    pub const MAX_SCORE: i16 = 5;

    pub fn new(trip_id: Uuid, passenger_id: UserId, driver_id: UserId, score: i16, comment: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            passenger_id,
            driver_id,
            score,
            comment,
            created_at: Utc::now(),
        }
    }
}

/// Trip as returned to callers, with its rating when one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripView {
    #[serde(flatten)]
    pub trip: Trip,
    pub rating: Option<Rating>,
}
