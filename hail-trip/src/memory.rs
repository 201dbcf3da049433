//! In-process backends for local runs and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hail_core::proximity::{DriverCandidate, NearbyQuery, ProximityClient, ProximityError};
use hail_core::repository::{
    RatingRepository, RejectionRepository, StoreError, StoreResult, TripChange, TripGuard, TripRepository,
};
use hail_core::{Rating, RejectionRecord, Trip, TripStatus};
use hail_shared::{Coordinates, UserId};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Trip, rejection and rating storage with the same conditional-update
/// semantics as the Postgres repositories.
#[derive(Default)]
pub struct InMemoryStore {
    trips: RwLock<HashMap<Uuid, Trip>>,
    rejections: RwLock<HashMap<Uuid, Vec<RejectionRecord>>>,
    ratings: RwLock<HashMap<Uuid, Rating>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rejections_for(&self, trip_id: Uuid) -> Vec<RejectionRecord> {
        self.rejections
            .read()
            .await
            .get(&trip_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn trip_count(&self) -> usize {
        self.trips.read().await.len()
    }
}

#[async_trait]
impl TripRepository for InMemoryStore {
    async fn insert_trip(&self, trip: &Trip) -> StoreResult<()> {
        let mut trips = self.trips.write().await;
        let has_active = !trip.status.is_terminal()
            && trips
                .values()
                .any(|t| t.passenger_id == trip.passenger_id && !t.status.is_terminal());
        if has_active {
            return Err(StoreError::Conflict(format!(
                "passenger {} already has an active trip",
                trip.passenger_id
            )));
        }
        if trips.contains_key(&trip.id) {
            return Err(StoreError::Conflict(format!("trip {} already exists", trip.id)));
        }
        trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>> {
        Ok(self.trips.read().await.get(&id).cloned())
    }

    async fn find_active_trip(&self, passenger_id: UserId) -> StoreResult<Option<Trip>> {
        Ok(self
            .trips
            .read()
            .await
            .values()
            .find(|t| t.passenger_id == passenger_id && !t.status.is_terminal())
            .cloned())
    }

    async fn transition(&self, id: Uuid, guard: TripGuard, change: TripChange) -> StoreResult<Option<Trip>> {
        let mut trips = self.trips.write().await;
        let Some(trip) = trips.get_mut(&id) else {
            return Ok(None);
        };
        if !guard.matches(trip) {
            return Ok(None);
        }
        trip.status = change.status;
        trip.driver_id = change.driver_id;
        trip.assignment_expires_at = change.assignment_expires_at;
        trip.updated_at = Utc::now();
        Ok(Some(trip.clone()))
    }

    async fn list_expired_assignments(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Trip>> {
        let trips = self.trips.read().await;
        let mut due: Vec<Trip> = trips
            .values()
            .filter(|t| t.status == TripStatus::DriverFound)
            .filter(|t| t.assignment_expires_at.is_some_and(|at| at < now))
            .cloned()
            .collect();
        due.sort_by_key(|t| t.assignment_expires_at);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }
}

#[async_trait]
impl RejectionRepository for InMemoryStore {
    async fn record_rejection(&self, record: &RejectionRecord) -> StoreResult<bool> {
        let mut rejections = self.rejections.write().await;
        let records = rejections.entry(record.trip_id).or_default();
        if records.iter().any(|r| r.driver_id == record.driver_id) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn list_rejected_drivers(&self, trip_id: Uuid) -> StoreResult<HashSet<UserId>> {
        Ok(self
            .rejections
            .read()
            .await
            .get(&trip_id)
            .map(|records| records.iter().map(|r| r.driver_id).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RatingRepository for InMemoryStore {
    async fn insert_rating(&self, rating: &Rating) -> StoreResult<()> {
        let mut ratings = self.ratings.write().await;
        if ratings.contains_key(&rating.trip_id) {
            return Err(StoreError::Conflict(format!("trip {} already rated", rating.trip_id)));
        }
        ratings.insert(rating.trip_id, rating.clone());
        Ok(())
    }

    async fn get_rating(&self, trip_id: Uuid) -> StoreResult<Option<Rating>> {
        Ok(self.ratings.read().await.get(&trip_id).cloned())
    }
}

/// Available drivers and their last known positions.
#[derive(Default)]
pub struct InMemoryDriverIndex {
    drivers: RwLock<HashMap<UserId, Coordinates>>,
}

impl InMemoryDriverIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, driver_id: UserId, coord: Coordinates) {
        self.drivers.write().await.insert(driver_id, coord);
    }

    pub async fn remove(&self, driver_id: UserId) -> bool {
        self.drivers.write().await.remove(&driver_id).is_some()
    }
}

#[async_trait]
impl ProximityClient for InMemoryDriverIndex {
    async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<DriverCandidate>, ProximityError> {
        let radius_km = query.unit.to_km(query.radius);
        let drivers = self.drivers.read().await;
        let mut candidates: Vec<DriverCandidate> = drivers
            .iter()
            .filter(|(id, _)| !query.exclude.contains(*id))
            .filter_map(|(id, coord)| {
                let km = query.pickup.distance_km(coord);
                (km <= radius_km).then(|| DriverCandidate {
                    driver_id: *id,
                    coord: *coord,
                    distance: query.unit.from_km(km),
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hail_shared::DistanceUnit;
    use rust_decimal::Decimal;

    fn trip(passenger_id: UserId) -> Trip {
        Trip::new(
            passenger_id,
            Coordinates::new(10.77, 106.70),
            Coordinates::new(10.78, 106.80),
            Decimal::new(5_000_000, 2),
        )
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_swap() {
        let store = InMemoryStore::new();
        let trip = trip(1);
        store.insert_trip(&trip).await.unwrap();

        let assign = TripChange {
            status: TripStatus::DriverFound,
            driver_id: Some(7),
            assignment_expires_at: Some(Utc::now()),
        };
        let guard = TripGuard::of(&trip);
        let first = store.transition(trip.id, guard, assign).await.unwrap();
        assert_eq!(first.map(|t| t.driver_id), Some(Some(7)));

        let second = store.transition(trip.id, guard, assign).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_one_active_trip_per_passenger() {
        let store = InMemoryStore::new();
        store.insert_trip(&trip(1)).await.unwrap();
        let err = store.insert_trip(&trip(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        store.insert_trip(&trip(2)).await.unwrap();
        assert_eq!(store.trip_count().await, 2);
    }

    #[tokio::test]
    async fn test_expired_assignments_are_listed_oldest_first() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        for (passenger, offset) in [(1, 30), (2, 60), (3, -30)] {
            let mut t = trip(passenger);
            t.status = TripStatus::DriverFound;
            t.driver_id = Some(passenger * 10);
            t.assignment_expires_at = Some(now - chrono::Duration::seconds(offset));
            store.insert_trip(&t).await.unwrap();
        }

        let due = store.list_expired_assignments(now, 10).await.unwrap();
        let drivers: Vec<_> = due.iter().map(|t| t.driver_id).collect();
        assert_eq!(drivers, vec![Some(20), Some(10)]);
        assert_eq!(store.list_expired_assignments(now, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_driver_index_orders_by_distance_within_radius() {
        let index = InMemoryDriverIndex::new();
        index.upsert(1, Coordinates::new(10.78, 106.70)).await;
        index.upsert(2, Coordinates::new(10.771, 106.70)).await;
        index.upsert(3, Coordinates::new(11.50, 106.70)).await;

        let query = NearbyQuery {
            pickup: Coordinates::new(10.77, 106.70),
            radius: 5000.0,
            unit: DistanceUnit::M,
            exclude: HashSet::new(),
        };
        let found = index.find_nearby(&query).await.unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.driver_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(found[0].distance > 100.0 && found[0].distance < 120.0);

        assert!(index.remove(2).await);
        let nearest = index.find_nearest(&query).await.unwrap();
        assert_eq!(nearest.map(|c| c.driver_id), Some(1));
    }
}
