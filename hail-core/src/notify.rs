use async_trait::async_trait;
use hail_shared::Notification;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification transport failed: {0}")]
    Transport(String),
}

/// Transport that delivers a notification to a user's real-time session.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Sink that only writes notifications to the log.
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = notification.user_id,
            trip_id = %notification.trip_id,
            event = %notification.event,
            "Notification published"
        );
        Ok(())
    }
}
