use std::sync::Arc;
use std::time::Duration;

use hail_core::proximity::{DriverCandidate, NearbyQuery, ProximityClient};
use hail_core::Trip;
use hail_shared::DistanceUnit;

use crate::error::TripResult;
use crate::ledger::RejectionLedger;

#[derive(Debug, Clone)]
pub struct MatchingSettings {
    pub radius: f64,
    pub unit: DistanceUnit,
    pub timeout: Duration,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            radius: 5.0,
            unit: DistanceUnit::Km,
            timeout: Duration::from_millis(2000),
        }
    }
}

/// Nearest-candidate search that honours the trip's rejection ledger.
pub struct Matcher {
    proximity: Arc<dyn ProximityClient>,
    ledger: RejectionLedger,
    settings: MatchingSettings,
}

impl Matcher {
    pub fn new(proximity: Arc<dyn ProximityClient>, ledger: RejectionLedger, settings: MatchingSettings) -> Self {
        Self {
            proximity,
            ledger,
            settings,
        }
    }

    /// Closest driver that has not declined or timed out on this trip.
    ///
    /// An unreachable or slow proximity service yields `None`; the trip then
    /// stays SEARCHING until the passenger retries.
    pub async fn find_candidate(&self, trip: &Trip) -> TripResult<Option<DriverCandidate>> {
        let query = NearbyQuery {
            pickup: trip.pickup,
            radius: self.settings.radius,
            unit: self.settings.unit,
            exclude: self.ledger.list_excluded(trip.id).await?,
        };

        let found = match tokio::time::timeout(self.settings.timeout, self.proximity.find_nearest(&query)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                tracing::warn!(trip_id = %trip.id, "Driver search failed: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    trip_id = %trip.id,
                    timeout_ms = self.settings.timeout.as_millis() as u64,
                    "Driver search timed out"
                );
                None
            }
        };

        let candidate = found.filter(|c| !query.exclude.contains(&c.driver_id));
        match &candidate {
            Some(c) => tracing::debug!(trip_id = %trip.id, driver_id = c.driver_id, distance = c.distance, "Driver candidate found"),
            None => tracing::info!(trip_id = %trip.id, excluded = query.exclude.len(), "No driver available"),
        }
        Ok(candidate)
    }
}
