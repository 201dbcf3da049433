use std::sync::Arc;

use hail_shared::{Masked, Notification};
use hail_store::{DbClient, RedisClient};
use hail_trip::{InMemoryDriverIndex, TripService};
use tokio::sync::broadcast;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Masked<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub trips: Arc<TripService>,
    pub auth: AuthConfig,
    pub redis: Option<Arc<RedisClient>>,
    pub db: Option<Arc<DbClient>>,
    /// Driver positions kept in process (`proximity.backend = "memory"`).
    pub drivers: Option<Arc<InMemoryDriverIndex>>,
    /// Present when notifications are served over `/v1/events`.
    pub events: Option<broadcast::Sender<Notification>>,
    pub metrics: Arc<Metrics>,
    pub rate_limit_per_minute: Option<i64>,
}
