pub mod app_config;
pub mod database;
pub mod driver_client;
#[cfg(feature = "kafka")]
pub mod events;
pub mod rating_repo;
pub mod redis_repo;
pub mod rejection_repo;
pub mod trip_repo;

pub use database::DbClient;
pub use driver_client::HttpProximityClient;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
pub use rating_repo::PgRatingRepository;
pub use redis_repo::RedisClient;
pub use rejection_repo::PgRejectionRepository;
pub use trip_repo::PgTripRepository;

/// Box a driver error into the storage error the domain traits return.
pub(crate) fn backend<E>(err: E) -> hail_core::repository::StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    hail_core::repository::StoreError::Backend(Box::new(err))
}
