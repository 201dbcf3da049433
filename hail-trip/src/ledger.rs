use std::collections::HashSet;
use std::sync::Arc;

use hail_core::repository::RejectionRepository;
use hail_core::{RejectionReason, RejectionRecord};
use hail_shared::UserId;
use uuid::Uuid;

use crate::error::TripResult;

/// Append-only record of drivers that declined or let a trip offer expire.
#[derive(Clone)]
pub struct RejectionLedger {
    repo: Arc<dyn RejectionRepository>,
}

impl RejectionLedger {
    pub fn new(repo: Arc<dyn RejectionRepository>) -> Self {
        Self { repo }
    }

    /// Insert-if-absent. Returns false when the pair was already recorded.
    pub async fn record(&self, trip_id: Uuid, driver_id: UserId, reason: RejectionReason) -> TripResult<bool> {
        let inserted = self
            .repo
            .record_rejection(&RejectionRecord::new(trip_id, driver_id, reason))
            .await?;
        if inserted {
            tracing::info!(%trip_id, driver_id, reason = reason.as_str(), "Driver excluded from trip");
        } else {
            tracing::debug!(%trip_id, driver_id, "Driver already excluded from trip");
        }
        Ok(inserted)
    }

    pub async fn list_excluded(&self, trip_id: Uuid) -> TripResult<HashSet<UserId>> {
        Ok(self.repo.list_rejected_drivers(trip_id).await?)
    }
}
