use async_trait::async_trait;
use hail_core::notify::{NotificationSink, NotifyError};
use hail_shared::Notification;
use redis::RedisResult;
use tracing::debug;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Publish to a pub/sub channel. Returns the number of subscribers reached.
    pub async fn publish_message(&self, channel: &str, payload: &str) -> RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
    }

    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Publishes each notification as JSON on the user's `user:{id}` channel.
#[async_trait]
impl NotificationSink for RedisClient {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(notification).map_err(|e| NotifyError::Transport(e.to_string()))?;
        let channel = notification.channel();
        let receivers = self
            .publish_message(&channel, &payload)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        debug!(channel = %channel, receivers, "Published notification to Redis");
        Ok(())
    }
}
