use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hail_shared::UserId;
use uuid::Uuid;

use crate::trip::{Rating, RejectionRecord, Trip, TripStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint was hit (active trip per passenger, rating per trip).
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Expected (status, driver) pair a conditional update must still observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripGuard {
    pub status: TripStatus,
    pub driver_id: Option<UserId>,
}

impl TripGuard {
    pub fn of(trip: &Trip) -> Self {
        Self {
            status: trip.status,
            driver_id: trip.driver_id,
        }
    }

    pub fn matches(&self, trip: &Trip) -> bool {
        trip.status == self.status && trip.driver_id == self.driver_id
    }
}

/// Values written by a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripChange {
    pub status: TripStatus,
    pub driver_id: Option<UserId>,
    pub assignment_expires_at: Option<DateTime<Utc>>,
}

/// Repository trait for trip data access
#[async_trait]
pub trait TripRepository: Send + Sync {
    /// Fails with `StoreError::Conflict` when the passenger already has an active trip.
    async fn insert_trip(&self, trip: &Trip) -> StoreResult<()>;

    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>>;

    /// The passenger's trip that is neither COMPLETED nor CANCELLED, if any.
    async fn find_active_trip(&self, passenger_id: UserId) -> StoreResult<Option<Trip>>;

    /// Apply `change` only if the stored row still matches `guard`.
    /// Returns the updated trip, or `None` when the guard no longer holds.
    async fn transition(&self, id: Uuid, guard: TripGuard, change: TripChange) -> StoreResult<Option<Trip>>;

    /// DRIVER_FOUND trips whose assignment deadline is before `now`.
    async fn list_expired_assignments(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Trip>>;
}

/// Repository trait for the per-trip rejection ledger
#[async_trait]
pub trait RejectionRepository: Send + Sync {
    /// Returns false when the (trip, driver) pair was already recorded.
    async fn record_rejection(&self, record: &RejectionRecord) -> StoreResult<bool>;

    async fn list_rejected_drivers(&self, trip_id: Uuid) -> StoreResult<HashSet<UserId>>;
}

/// Repository trait for trip ratings
#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Fails with `StoreError::Conflict` when the trip is already rated.
    async fn insert_rating(&self, rating: &Rating) -> StoreResult<()>;

    async fn get_rating(&self, trip_id: Uuid) -> StoreResult<Option<Rating>>;
}
