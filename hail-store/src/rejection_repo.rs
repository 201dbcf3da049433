use std::collections::HashSet;

use async_trait::async_trait;
use hail_core::repository::{RejectionRepository, StoreResult};
use hail_core::RejectionRecord;
use hail_shared::UserId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend;

pub struct PgRejectionRepository {
    pool: PgPool,
}

impl PgRejectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RejectionRepository for PgRejectionRepository {
    async fn record_rejection(&self, record: &RejectionRecord) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO trip_rejections (trip_id, driver_id, reason, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (trip_id, driver_id) DO NOTHING
            "#,
        )
        .bind(record.trip_id)
        .bind(record.driver_id)
        .bind(record.reason.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_rejected_drivers(&self, trip_id: Uuid) -> StoreResult<HashSet<UserId>> {
        let drivers: Vec<i64> = sqlx::query_scalar("SELECT driver_id FROM trip_rejections WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(drivers.into_iter().collect())
    }
}
