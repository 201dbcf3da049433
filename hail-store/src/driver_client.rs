use std::time::Duration;

use async_trait::async_trait;
use hail_core::proximity::{DriverCandidate, NearbyQuery, ProximityClient, ProximityError};
use hail_shared::Coordinates;
use serde::Deserialize;
use tracing::debug;

/// Client for the driver service's `GET /drivers/search`.
pub struct HttpProximityClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpProximityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProximityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProximityError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/drivers/search", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
pub struct DriverSearchResponse {
    pub count: usize,
    pub drivers: Vec<DriverSearchResult>,
}

#[derive(Debug, Deserialize)]
pub struct DriverSearchResult {
    /// The driver service reports ids as strings.
    pub id: String,
    pub coord: Coordinates,
    pub distance: f64,
}

impl DriverSearchResponse {
    pub fn into_candidates(self) -> Result<Vec<DriverCandidate>, ProximityError> {
        self.drivers
            .into_iter()
            .map(|d| {
                let driver_id = d
                    .id
                    .trim()
                    .parse()
                    .map_err(|_| ProximityError::InvalidResponse(format!("driver id {:?} is not numeric", d.id)))?;
                Ok(DriverCandidate {
                    driver_id,
                    coord: d.coord,
                    distance: d.distance,
                })
            })
            .collect()
    }
}

/// Query string for a search, `excludeDriverIds` only when non-empty.
pub fn search_params(query: &NearbyQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("lat", query.pickup.lat.to_string()),
        ("lng", query.pickup.lng.to_string()),
        ("radius", query.radius.to_string()),
        ("unit", query.unit.as_str().to_string()),
    ];
    if !query.exclude.is_empty() {
        let mut ids: Vec<_> = query.exclude.iter().copied().collect();
        ids.sort_unstable();
        let joined = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        params.push(("excludeDriverIds", joined));
    }
    params
}

#[async_trait]
impl ProximityClient for HttpProximityClient {
    async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<DriverCandidate>, ProximityError> {
        let response = self
            .http
            .get(self.search_url())
            .query(&search_params(query))
            .send()
            .await
            .map_err(|e| ProximityError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProximityError::Unavailable(e.to_string()))?;

        let body: DriverSearchResponse = response
            .json()
            .await
            .map_err(|e| ProximityError::InvalidResponse(e.to_string()))?;
        debug!(count = body.count, "Driver search returned");
        body.into_candidates()
    }
}
