use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    extract::{Extension, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream, StreamExt};
use hail_core::notify::{NotificationSink, NotifyError};
use hail_core::AuthUser;
use hail_shared::Notification;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::AppError;
use crate::state::AppState;

/// Fans notifications out to every open `/v1/events` stream.
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<Notification>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        // No open streams is not a failure.
        if self.tx.send(notification.clone()).is_err() {
            tracing::debug!(user_id = notification.user_id, "No event stream connected");
        }
        Ok(())
    }
}

/// SSE stream of the caller's own notifications. The event name is the
/// notification type and the data is the trip JSON.
pub async fn events_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let tx = state
        .events
        .as_ref()
        .ok_or_else(|| AppError::NotFoundError("Event stream is not enabled".to_string()))?;
    let rx = tx.subscribe();
    tracing::info!(user_id = user.id, "Event stream opened");

    let connected = stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let events = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(notification) if notification.user_id == user.id => Event::default()
                .event(notification.event.as_str())
                .json_data(&notification.payload)
                .ok()
                .map(Ok),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!(user_id = user.id, missed, "Event stream lagged");
                None
            }
        }
    });

    Ok(Sse::new(connected.chain(events)).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hail_shared::TripEventKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sink_broadcasts_to_subscribers() {
        let (tx, mut rx) = broadcast::channel(8);
        let sink = BroadcastSink::new(tx);
        let notification = Notification::new(
            9,
            TripEventKind::TripRequest,
            Uuid::new_v4(),
            serde_json::json!({"status": "DRIVER_FOUND"}),
        );

        sink.publish(&notification).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.user_id, 9);
        assert_eq!(received.event, TripEventKind::TripRequest);
    }

    #[tokio::test]
    async fn test_publish_without_listeners_succeeds() {
        let (tx, rx) = broadcast::channel::<Notification>(8);
        drop(rx);
        let sink = BroadcastSink::new(tx);
        let notification = Notification::new(1, TripEventKind::TripUpdate, Uuid::new_v4(), serde_json::json!({}));
        assert!(sink.publish(&notification).await.is_ok());
    }
}
