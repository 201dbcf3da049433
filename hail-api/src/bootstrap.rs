use std::sync::Arc;

use anyhow::Context;
use hail_core::notify::{LoggingSink, NotificationSink};
use hail_core::proximity::ProximityClient;
use hail_core::repository::{RatingRepository, RejectionRepository, TripRepository};
use hail_store::app_config::{Config, NotificationBackend, ProximityBackend, StorageBackend};
use hail_store::{
    DbClient, HttpProximityClient, PgRatingRepository, PgRejectionRepository, PgTripRepository, RedisClient,
};
use hail_trip::{
    DispatchSettings, InMemoryDriverIndex, InMemoryStore, NotificationDispatcher, TimeoutSupervisor, TripService,
    TripServiceParts,
};
use tokio::sync::broadcast;
use tracing::info;

use crate::metrics::Metrics;
use crate::state::{AppState, AuthConfig};
use crate::stream::BroadcastSink;
use crate::worker::BackgroundWorkers;

pub struct Bootstrap {
    pub state: AppState,
    pub workers: BackgroundWorkers,
}

struct Repositories {
    trips: Arc<dyn TripRepository>,
    rejections: Arc<dyn RejectionRepository>,
    ratings: Arc<dyn RatingRepository>,
    /// Present for the Postgres backend, pinged by `/health`.
    db: Option<Arc<DbClient>>,
}

/// Wire configured backends into a trip service and application state.
pub async fn build(config: &Config) -> anyhow::Result<Bootstrap> {
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    let redis = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url).await.context("Failed to connect to Redis")?,
        )),
        None => None,
    };

    let Repositories {
        trips,
        rejections,
        ratings,
        db,
    } = repositories(config).await?;

    // Positions are reported over `/v1/drivers/me/location`.
    let mut driver_index = None;
    let proximity: Arc<dyn ProximityClient> = match config.proximity.backend {
        ProximityBackend::Http => Arc::new(
            HttpProximityClient::new(config.proximity.base_url.clone(), config.dispatch.proximity_timeout())
                .context("Failed to build driver service client")?,
        ),
        ProximityBackend::Memory => {
            let index = Arc::new(InMemoryDriverIndex::new());
            driver_index = Some(index.clone());
            index
        }
    };

    let mut events = None;
    let sink: Arc<dyn NotificationSink> = match config.notifications.backend {
        NotificationBackend::Sse => {
            let (tx, _) = broadcast::channel(config.notifications.sse_buffer.max(1));
            events = Some(tx.clone());
            Arc::new(BroadcastSink::new(tx))
        }
        NotificationBackend::Redis => {
            let client: Arc<RedisClient> = redis
                .clone()
                .context("notifications.backend = \"redis\" requires a [redis] section")?;
            client
        }
        NotificationBackend::Kafka => kafka_sink(config)?,
        NotificationBackend::Log => Arc::new(LoggingSink),
    };
    info!(
        storage = ?config.storage.backend,
        proximity = ?config.proximity.backend,
        notifications = ?config.notifications.backend,
        "Backends configured"
    );

    let (dispatcher, dispatch) = NotificationDispatcher::new(sink, config.notifications.queue_capacity);
    let (supervisor, expiries) = TimeoutSupervisor::new(config.dispatch.assignment_timeout())
        .context("Invalid dispatch.assignment_timeout_seconds")?;

    let service = Arc::new(TripService::new(TripServiceParts {
        trips,
        rejections,
        ratings,
        proximity,
        dispatcher,
        supervisor,
        settings: DispatchSettings {
            search_radius: config.dispatch.search_radius,
            search_unit: config.dispatch.search_unit,
            proximity_timeout: config.dispatch.proximity_timeout(),
            flat_fare: config.pricing.flat_fare,
            sweep_batch: config.dispatch.sweep_batch,
        },
    }));

    Ok(Bootstrap {
        state: AppState {
            trips: service,
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
            },
            redis,
            db,
            drivers: driver_index,
            events,
            metrics,
            rate_limit_per_minute: config.server.rate_limit_per_minute,
        },
        workers: BackgroundWorkers {
            dispatch,
            expiries,
            sweep_interval: config.dispatch.sweep_interval(),
        },
    })
}

async fn repositories(config: &Config) -> anyhow::Result<Repositories> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let db = DbClient::new(config.database.url.expose(), config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Ok(Repositories {
                trips: Arc::new(PgTripRepository::new(db.pool.clone())),
                rejections: Arc::new(PgRejectionRepository::new(db.pool.clone())),
                ratings: Arc::new(PgRatingRepository::new(db.pool.clone())),
                db: Some(Arc::new(db)),
            })
        }
        StorageBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            Ok(Repositories {
                trips: store.clone(),
                rejections: store.clone(),
                ratings: store,
                db: None,
            })
        }
    }
}

#[cfg(feature = "kafka")]
fn kafka_sink(config: &Config) -> anyhow::Result<Arc<dyn NotificationSink>> {
    let kafka = config
        .kafka
        .as_ref()
        .context("notifications.backend = \"kafka\" requires a [kafka] section")?;
    let producer =
        hail_store::EventProducer::new(&kafka.brokers, &kafka.topic).context("Failed to create Kafka producer")?;
    Ok(Arc::new(producer))
}

#[cfg(not(feature = "kafka"))]
fn kafka_sink(_config: &Config) -> anyhow::Result<Arc<dyn NotificationSink>> {
    anyhow::bail!("notifications.backend = \"kafka\" requires building with the `kafka` feature")
}
