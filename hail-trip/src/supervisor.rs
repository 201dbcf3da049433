use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use hail_shared::UserId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{TripError, TripResult};
use crate::service::TripService;

/// A driver's response window for a trip ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentExpiry {
    pub trip_id: Uuid,
    pub driver_id: UserId,
}

struct PendingTimer {
    driver_id: UserId,
    episode: u64,
    handle: JoinHandle<()>,
}

type TimerMap = Arc<Mutex<HashMap<Uuid, PendingTimer>>>;

/// One deferred expiry per DRIVER_FOUND episode.
///
/// Expiries are delivered on a channel rather than acted on in the timer
/// task so the supervisor never depends on the trip service.
pub struct TimeoutSupervisor {
    window: Duration,
    deadline_offset: chrono::Duration,
    timers: TimerMap,
    next_episode: AtomicU64,
    expiry_tx: mpsc::UnboundedSender<AssignmentExpiry>,
}

impl TimeoutSupervisor {
    /// Longest response window a driver can be given.
    pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

    /// Fails when `window` is zero or longer than [`Self::MAX_WINDOW`].
    pub fn new(window: Duration) -> TripResult<(Self, mpsc::UnboundedReceiver<AssignmentExpiry>)> {
        if window.is_zero() || window > Self::MAX_WINDOW {
            return Err(TripError::Validation(format!(
                "assignment window must be between 1ms and {}s, got {}ms",
                Self::MAX_WINDOW.as_secs(),
                window.as_millis()
            )));
        }
        let deadline_offset = chrono::Duration::from_std(window)
            .map_err(|e| TripError::Validation(format!("assignment window out of range: {}", e)))?;

        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            window,
            deadline_offset,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_episode: AtomicU64::new(1),
            expiry_tx,
        };
        Ok((supervisor, expiry_rx))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// When an assignment made at `now` stops being answerable.
    pub fn deadline(&self, now: DateTime<Utc>) -> TripResult<DateTime<Utc>> {
        now.checked_add_signed(self.deadline_offset)
            .ok_or_else(|| TripError::Validation("assignment deadline is past the supported date range".to_string()))
    }

    /// Schedule expiry of `driver_id`'s assignment, replacing any pending timer for the trip.
    pub fn arm(&self, trip_id: Uuid, driver_id: UserId) {
        let episode = self.next_episode.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let expiry_tx = self.expiry_tx.clone();
        let window = self.window;

        let mut pending = lock(&self.timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            {
                let mut pending = lock(&timers);
                if pending.get(&trip_id).map(|t| t.episode) == Some(episode) {
                    pending.remove(&trip_id);
                }
            }
            debug!(%trip_id, driver_id, episode, "Assignment window elapsed");
            let _ = expiry_tx.send(AssignmentExpiry { trip_id, driver_id });
        });

        if let Some(previous) = pending.insert(
            trip_id,
            PendingTimer {
                driver_id,
                episode,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        debug!(%trip_id, driver_id, episode, window_secs = window.as_secs(), "Assignment timer armed");
    }

    /// Abort the pending timer for the trip. Returns false when none was pending.
    pub fn cancel(&self, trip_id: Uuid) -> bool {
        match lock(&self.timers).remove(&trip_id) {
            Some(timer) => {
                timer.handle.abort();
                debug!(%trip_id, driver_id = timer.driver_id, episode = timer.episode, "Assignment timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        lock(&self.timers).len()
    }

    pub fn armed_driver(&self, trip_id: Uuid) -> Option<UserId> {
        lock(&self.timers).get(&trip_id).map(|t| t.driver_id)
    }
}

impl Drop for TimeoutSupervisor {
    fn drop(&mut self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }
}

fn lock(timers: &TimerMap) -> MutexGuard<'_, HashMap<Uuid, PendingTimer>> {
    timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Feed fired timers back into the state machine.
pub async fn run_expiry_loop(service: Arc<TripService>, mut expiries: mpsc::UnboundedReceiver<AssignmentExpiry>) {
    info!("Assignment expiry loop started");
    while let Some(expiry) = expiries.recv().await {
        match service.expire_assignment(expiry.trip_id, expiry.driver_id).await {
            Ok(Some(trip)) => info!(trip_id = %trip.id, status = %trip.status, "Expired assignment released"),
            Ok(None) => debug!(trip_id = %expiry.trip_id, "Expiry ignored, driver already responded"),
            Err(e) => error!(trip_id = %expiry.trip_id, "Failed to expire assignment: {}", e),
        }
    }
    info!("Assignment expiry loop stopped");
}

/// Periodically expire assignments whose persisted deadline has passed.
/// Covers timers lost to a restart or owned by another instance.
pub async fn run_expiry_sweep(service: Arc<TripService>, every: Duration) {
    info!(interval_secs = every.as_secs(), "Assignment sweep started");
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match service.sweep_expired_assignments().await {
            Ok(0) => {}
            Ok(released) => info!(released, "Sweep released expired assignments"),
            Err(e) => warn!("Assignment sweep failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_window() {
        let (supervisor, mut expiries) = TimeoutSupervisor::new(Duration::from_secs(15)).unwrap();
        let trip_id = Uuid::new_v4();
        supervisor.arm(trip_id, 7);
        assert_eq!(supervisor.armed_driver(trip_id), Some(7));

        let expiry = expiries.recv().await.unwrap();
        assert_eq!(expiry, AssignmentExpiry { trip_id, driver_id: 7 });
        assert_eq!(supervisor.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (supervisor, mut expiries) = TimeoutSupervisor::new(Duration::from_secs(15)).unwrap();
        let trip_id = Uuid::new_v4();
        supervisor.arm(trip_id, 7);
        assert!(supervisor.cancel(trip_id));
        assert!(!supervisor.cancel(trip_id));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(expiries.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_episode() {
        let (supervisor, mut expiries) = TimeoutSupervisor::new(Duration::from_secs(15)).unwrap();
        let trip_id = Uuid::new_v4();
        supervisor.arm(trip_id, 7);
        tokio::time::sleep(Duration::from_secs(5)).await;
        supervisor.arm(trip_id, 8);
        assert_eq!(supervisor.pending(), 1);

        let expiry = expiries.recv().await.unwrap();
        assert_eq!(expiry.driver_id, 8);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(expiries.try_recv().is_err());
    }

    #[test]
    fn test_unrepresentable_window_is_rejected() {
        assert!(matches!(TimeoutSupervisor::new(Duration::ZERO), Err(TripError::Validation(_))));
        assert!(matches!(
            TimeoutSupervisor::new(Duration::from_secs(u64::MAX)),
            Err(TripError::Validation(_))
        ));
        assert!(TimeoutSupervisor::new(TimeoutSupervisor::MAX_WINDOW).is_ok());
    }

    #[test]
    fn test_deadline_follows_configured_window() {
        let (supervisor, _expiries) = TimeoutSupervisor::new(Duration::from_secs(40)).unwrap();
        let now = Utc::now();
        assert_eq!(supervisor.deadline(now).unwrap(), now + chrono::Duration::seconds(40));
        assert!(supervisor.deadline(DateTime::<Utc>::MAX_UTC).is_err());
    }
}
