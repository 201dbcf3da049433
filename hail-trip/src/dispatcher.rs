use std::sync::Arc;

use hail_core::notify::NotificationSink;
use hail_core::Trip;
use hail_shared::{Notification, TripEventKind, UserId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub enum DispatchCommand {
    Deliver(Notification),
    /// Acknowledged once every earlier command has been handled.
    Flush(oneshot::Sender<()>),
}

/// Queue between trip transitions and the real-time transport.
///
/// Enqueueing never waits on delivery; a full queue drops the event.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<DispatchCommand>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, capacity: usize) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, DispatchWorker { rx, sink })
    }

    /// Queue a `kind` event for `user_id` carrying the full trip.
    pub fn notify(&self, user_id: UserId, kind: TripEventKind, trip: &Trip) {
        let payload = match serde_json::to_value(trip) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(trip_id = %trip.id, "Failed to serialize trip for notification: {}", e);
                return;
            }
        };
        let notification = Notification::new(user_id, kind, trip.id, payload);
        if let Err(e) = self.tx.try_send(DispatchCommand::Deliver(notification)) {
            warn!(user_id, trip_id = %trip.id, event = %kind, "Notification dropped: {}", e);
        }
    }

    /// Wait until everything queued so far has been handed to the sink.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(DispatchCommand::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

pub struct DispatchWorker {
    rx: mpsc::Receiver<DispatchCommand>,
    sink: Arc<dyn NotificationSink>,
}

impl DispatchWorker {
    pub async fn run(mut self) {
        info!("Notification dispatcher started");
        while let Some(command) = self.rx.recv().await {
            match command {
                DispatchCommand::Deliver(notification) => match self.sink.publish(&notification).await {
                    Ok(()) => debug!(
                        user_id = notification.user_id,
                        trip_id = %notification.trip_id,
                        event = %notification.event,
                        "Notification delivered"
                    ),
                    Err(e) => warn!(
                        user_id = notification.user_id,
                        trip_id = %notification.trip_id,
                        "Notification delivery failed: {}",
                        e
                    ),
                },
                DispatchCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        info!("Notification dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hail_core::notify::NotifyError;
    use hail_shared::Coordinates;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakySink {
        delivered: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
            if notification.user_id == 0 {
                return Err(NotifyError::Transport("no session".to_string()));
            }
            self.delivered.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_the_worker() {
        let sink = Arc::new(FlakySink::default());
        let (dispatcher, worker) = NotificationDispatcher::new(sink.clone(), 16);
        tokio::spawn(worker.run());

        let trip = Trip::new(
            5,
            Coordinates::new(10.77, 106.70),
            Coordinates::new(10.78, 106.80),
            Decimal::new(5_000_000, 2),
        );
        dispatcher.notify(0, TripEventKind::TripUpdate, &trip);
        dispatcher.notify(5, TripEventKind::TripUpdate, &trip);
        dispatcher.flush().await;

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].user_id, 5);
        assert_eq!(delivered[0].payload["status"], "SEARCHING");
    }
}
