use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hail_core::repository::{StoreError, StoreResult, TripChange, TripGuard, TripRepository};
use hail_core::{Trip, TripStatus};
use hail_shared::{Coordinates, UserId};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend;

const TRIP_COLUMNS: &str = "id, passenger_id, driver_id, pickup_lat, pickup_lng, dropoff_lat, dropoff_lng, \
     status, price_estimate, assignment_expires_at, created_at, updated_at";

pub struct PgTripRepository {
    pool: PgPool,
}

impl PgTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    passenger_id: i64,
    driver_id: Option<i64>,
    pickup_lat: f64,
    pickup_lng: f64,
    dropoff_lat: f64,
    dropoff_lng: f64,
    status: String,
    price_estimate: Decimal,
    assignment_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        Ok(Trip {
            id: row.id,
            passenger_id: row.passenger_id,
            driver_id: row.driver_id,
            pickup: Coordinates::new(row.pickup_lat, row.pickup_lng),
            dropoff: Coordinates::new(row.dropoff_lat, row.dropoff_lng),
            status: row.status.parse::<TripStatus>().map_err(backend)?,
            price_estimate: row.price_estimate,
            assignment_expires_at: row.assignment_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl TripRepository for PgTripRepository {
    async fn insert_trip(&self, trip: &Trip) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO trips (id, passenger_id, driver_id, pickup_lat, pickup_lng, dropoff_lat, dropoff_lng,
                               status, price_estimate, assignment_expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(trip.id)
        .bind(trip.passenger_id)
        .bind(trip.driver_id)
        .bind(trip.pickup.lat)
        .bind(trip.pickup.lng)
        .bind(trip.dropoff.lat)
        .bind(trip.dropoff.lng)
        .bind(trip.status.as_str())
        .bind(trip.price_estimate)
        .bind(trip.assignment_expires_at)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // trips_one_active_per_passenger
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(StoreError::Conflict(format!(
                "passenger {} already has an active trip",
                trip.passenger_id
            ))),
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_trip(&self, id: Uuid) -> StoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(Trip::try_from).transpose()
    }

    async fn find_active_trip(&self, passenger_id: UserId) -> StoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE passenger_id = $1 AND status NOT IN ('COMPLETED', 'CANCELLED') LIMIT 1",
            TRIP_COLUMNS
        ))
        .bind(passenger_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(Trip::try_from).transpose()
    }

    async fn transition(&self, id: Uuid, guard: TripGuard, change: TripChange) -> StoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            r#"
            UPDATE trips
            SET status = $4, driver_id = $5, assignment_expires_at = $6, updated_at = NOW()
            WHERE id = $1 AND status = $2 AND driver_id IS NOT DISTINCT FROM $3
            RETURNING {}
            "#,
            TRIP_COLUMNS
        ))
        .bind(id)
        .bind(guard.status.as_str())
        .bind(guard.driver_id)
        .bind(change.status.as_str())
        .bind(change.driver_id)
        .bind(change.assignment_expires_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(Trip::try_from).transpose()
    }

    async fn list_expired_assignments(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Trip>> {
        let rows = sqlx::query_as::<_, TripRow>(&format!(
            r#"
            SELECT {} FROM trips
            WHERE status = 'DRIVER_FOUND' AND assignment_expires_at < $1
            ORDER BY assignment_expires_at
            LIMIT $2
            "#,
            TRIP_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(Trip::try_from).collect()
    }
}
