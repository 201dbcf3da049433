use std::collections::HashSet;

use async_trait::async_trait;
use hail_shared::{Coordinates, DistanceUnit, UserId};
use serde::{Deserialize, Serialize};

/// Search around a pickup point, skipping drivers already excluded for the trip.
#[derive(Debug, Clone)]
pub struct NearbyQuery {
    pub pickup: Coordinates,
    pub radius: f64,
    pub unit: DistanceUnit,
    pub exclude: HashSet<UserId>,
}

/// One available driver near the pickup, nearest first in search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverCandidate {
    pub driver_id: UserId,
    pub coord: Coordinates,
    /// Distance from the pickup, in the query unit.
    pub distance: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ProximityError {
    #[error("Proximity service unreachable: {0}")]
    Unavailable(String),
    #[error("Proximity service returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ProximityClient: Send + Sync {
    /// Available drivers within the radius, ordered by ascending distance.
    async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<DriverCandidate>, ProximityError>;

    /// Nearest candidate not in the exclusion set.
    async fn find_nearest(&self, query: &NearbyQuery) -> Result<Option<DriverCandidate>, ProximityError> {
        let candidates = self.find_nearby(query).await?;
        Ok(candidates
            .into_iter()
            .find(|candidate| !query.exclude.contains(&candidate.driver_id)))
    }
}
