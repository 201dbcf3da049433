use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hail_core::repository::{RatingRepository, StoreError, StoreResult};
use hail_core::Rating;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend;

pub struct PgRatingRepository {
    pool: PgPool,
}

impl PgRatingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    id: Uuid,
    trip_id: Uuid,
    passenger_id: i64,
    driver_id: i64,
    score: i16,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<RatingRow> for Rating {
    fn from(row: RatingRow) -> Self {
        Rating {
            id: row.id,
            trip_id: row.trip_id,
            passenger_id: row.passenger_id,
            driver_id: row.driver_id,
            score: row.score,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl RatingRepository for PgRatingRepository {
    async fn insert_rating(&self, rating: &Rating) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO trip_ratings (id, trip_id, passenger_id, driver_id, score, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(rating.id)
        .bind(rating.trip_id)
        .bind(rating.passenger_id)
        .bind(rating.driver_id)
        .bind(rating.score)
        .bind(rating.comment.as_deref())
        .bind(rating.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict(format!("trip {} already rated", rating.trip_id)))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_rating(&self, trip_id: Uuid) -> StoreResult<Option<Rating>> {
        let row = sqlx::query_as::<_, RatingRow>(
            "SELECT id, trip_id, passenger_id, driver_id, score, comment, created_at FROM trip_ratings WHERE trip_id = $1",
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(Rating::from))
    }
}
