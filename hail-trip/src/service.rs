use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hail_core::proximity::ProximityClient;
use hail_core::repository::{RatingRepository, RejectionRepository, TripRepository};
use hail_core::{AuthUser, Rating, RejectionReason, Role, Trip, TripStatus, TripView};
use hail_shared::{Coordinates, DistanceUnit, TripEventKind, UserId};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatcher::NotificationDispatcher;
use crate::error::{TripError, TripResult};
use crate::ledger::RejectionLedger;
use crate::machine::{self, Transition, TripAction};
use crate::matching::{Matcher, MatchingSettings};
use crate::supervisor::TimeoutSupervisor;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub search_radius: f64,
    pub search_unit: DistanceUnit,
    pub proximity_timeout: Duration,
    /// Price quoted for every trip.
    pub flat_fare: Decimal,
    /// Upper bound on trips released per sweep.
    pub sweep_batch: i64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            search_radius: 5.0,
            search_unit: DistanceUnit::Km,
            proximity_timeout: Duration::from_millis(2000),
            flat_fare: Decimal::new(5_000_000, 2),
            sweep_batch: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripRequest {
    pub from_lat: f64,
    pub from_lng: f64,
    pub to_lat: f64,
    pub to_lng: f64,
}

impl TripRequest {
    pub fn pickup(&self) -> Coordinates {
        Coordinates::new(self.from_lat, self.from_lng)
    }

    pub fn dropoff(&self) -> Coordinates {
        Coordinates::new(self.to_lat, self.to_lng)
    }

    pub fn validate(&self) -> TripResult<()> {
        if !self.pickup().is_valid() {
            return Err(TripError::Validation("pickup coordinates out of range".to_string()));
        }
        if !self.dropoff().is_valid() {
            return Err(TripError::Validation("dropoff coordinates out of range".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatingRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

pub struct TripServiceParts {
    pub trips: Arc<dyn TripRepository>,
    pub rejections: Arc<dyn RejectionRepository>,
    pub ratings: Arc<dyn RatingRepository>,
    pub proximity: Arc<dyn ProximityClient>,
    pub dispatcher: NotificationDispatcher,
    pub supervisor: TimeoutSupervisor,
    pub settings: DispatchSettings,
}

/// Trip lifecycle orchestrator. Every mutation is a conditional update on
/// the trip's (status, driver) pair; a lost race surfaces as `InvalidState`.
pub struct TripService {
    trips: Arc<dyn TripRepository>,
    ratings: Arc<dyn RatingRepository>,
    ledger: RejectionLedger,
    matcher: Matcher,
    dispatcher: NotificationDispatcher,
    supervisor: TimeoutSupervisor,
    settings: DispatchSettings,
}

impl TripService {
    pub fn new(parts: TripServiceParts) -> Self {
        let ledger = RejectionLedger::new(parts.rejections);
        let matcher = Matcher::new(
            parts.proximity,
            ledger.clone(),
            MatchingSettings {
                radius: parts.settings.search_radius,
                unit: parts.settings.search_unit,
                timeout: parts.settings.proximity_timeout,
            },
        );
        Self {
            trips: parts.trips,
            ratings: parts.ratings,
            ledger,
            matcher,
            dispatcher: parts.dispatcher,
            supervisor: parts.supervisor,
            settings: parts.settings,
        }
    }

    pub fn supervisor(&self) -> &TimeoutSupervisor {
        &self.supervisor
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Create a SEARCHING trip for the passenger and try to match it.
    pub async fn create_trip(&self, actor: &AuthUser, request: TripRequest) -> TripResult<Trip> {
        if actor.role != Role::Passenger {
            return Err(TripError::Forbidden("only passengers can request trips".to_string()));
        }
        request.validate()?;

        if let Some(active) = self.trips.find_active_trip(actor.id).await? {
            return Err(TripError::Conflict(format!(
                "passenger already has an active trip {}",
                active.id
            )));
        }

        let trip = Trip::new(actor.id, request.pickup(), request.dropoff(), self.settings.flat_fare);
        self.trips.insert_trip(&trip).await?;
        info!(trip_id = %trip.id, passenger_id = actor.id, "Trip created");

        // The trip exists now; the passenger gets it back even if matching fails.
        let trip_id = trip.id;
        match self.match_driver(trip.clone()).await {
            Ok(matched) => Ok(matched),
            Err(e) => {
                warn!(%trip_id, "Matching failed, trip left searching: {}", e);
                Ok(self.trips.get_trip(trip_id).await.ok().flatten().unwrap_or(trip))
            }
        }
    }

    pub async fn get_trip(&self, actor: &AuthUser, trip_id: Uuid) -> TripResult<TripView> {
        let trip = self.load(trip_id).await?;
        machine::ensure_can_view(&trip, actor)?;
        let rating = self.ratings.get_rating(trip_id).await?;
        Ok(TripView { trip, rating })
    }

    pub async fn accept_trip(&self, actor: &AuthUser, trip_id: Uuid) -> TripResult<Trip> {
        let trip = self.load(trip_id).await?;
        let transition = self.plan_driver_step(&trip, actor, TripAction::Accept).await?;
        let accepted = self.apply(trip_id, transition, TripAction::Accept).await?;

        self.supervisor.cancel(trip_id);
        info!(%trip_id, driver_id = actor.id, "Trip accepted");
        self.dispatcher
            .notify(accepted.passenger_id, TripEventKind::TripUpdate, &accepted);
        Ok(accepted)
    }

    /// Driver declines the offer: the driver is excluded from this trip and
    /// matching runs again. Returns the trip after rematching.
    pub async fn reject_trip(&self, actor: &AuthUser, trip_id: Uuid) -> TripResult<Trip> {
        let trip = self.load(trip_id).await?;
        self.plan_driver_step(&trip, actor, TripAction::Reject).await?;

        let released = self
            .release(&trip, actor.id, RejectionReason::Rejected)
            .await?
            .ok_or_else(|| TripError::InvalidState("trip changed while rejecting".to_string()))?;

        self.supervisor.cancel(trip_id);
        info!(%trip_id, driver_id = actor.id, "Trip rejected, rematching");
        self.match_driver(released).await
    }

    /// Re-entry point for an elapsed response window. Acts only when the trip
    /// is still DRIVER_FOUND with `driver_id`; otherwise returns `None`.
    pub async fn expire_assignment(&self, trip_id: Uuid, driver_id: UserId) -> TripResult<Option<Trip>> {
        let Some(trip) = self.trips.get_trip(trip_id).await? else {
            return Ok(None);
        };
        if machine::plan_release(&trip, driver_id).is_none() {
            debug!(%trip_id, driver_id, status = %trip.status, "Assignment no longer pending");
            return Ok(None);
        }

        let Some(released) = self.release(&trip, driver_id, RejectionReason::TimedOut).await? else {
            debug!(%trip_id, driver_id, "Driver responded before expiry");
            return Ok(None);
        };

        self.supervisor.cancel(trip_id);
        info!(%trip_id, driver_id, "Driver did not respond in time, rematching");
        self.dispatcher
            .notify(driver_id, TripEventKind::TripUpdate, &released);
        self.match_driver(released).await.map(Some)
    }

    pub async fn start_trip(&self, actor: &AuthUser, trip_id: Uuid) -> TripResult<Trip> {
        self.advance(actor, trip_id, TripAction::Start).await
    }

    pub async fn complete_trip(&self, actor: &AuthUser, trip_id: Uuid) -> TripResult<Trip> {
        self.advance(actor, trip_id, TripAction::Complete).await
    }

    pub async fn cancel_trip(&self, actor: &AuthUser, trip_id: Uuid) -> TripResult<Trip> {
        let trip = self.load(trip_id).await?;
        let transition = machine::plan(&trip, actor, TripAction::Cancel)?;
        let previous_driver = trip.driver_id;
        let cancelled = self.apply(trip_id, transition, TripAction::Cancel).await?;

        self.supervisor.cancel(trip_id);
        info!(%trip_id, passenger_id = actor.id, "Trip cancelled");
        if let Some(driver_id) = previous_driver {
            self.dispatcher
                .notify(driver_id, TripEventKind::TripUpdate, &cancelled);
        }
        Ok(cancelled)
    }

    /// Checks run in order: ownership, COMPLETED, not yet rated, score range.
    pub async fn rate_trip(&self, actor: &AuthUser, trip_id: Uuid, request: RatingRequest) -> TripResult<Rating> {
        let trip = self.load(trip_id).await?;
        machine::ensure_owner(&trip, actor)?;
        if trip.status != TripStatus::Completed {
            return Err(TripError::InvalidState(format!("cannot rate a trip that is {}", trip.status)));
        }
        if self.ratings.get_rating(trip_id).await?.is_some() {
            return Err(TripError::Conflict("trip has already been rated".to_string()));
        }
        let score = i16::try_from(request.rating)
            .ok()
            .filter(|s| (Rating::MIN_SCORE..=Rating::MAX_SCORE).contains(s))
            .ok_or_else(|| {
                TripError::Validation(format!(
                    "rating must be between {} and {}",
                    Rating::MIN_SCORE,
                    Rating::MAX_SCORE
                ))
            })?;
        let driver_id = trip
            .driver_id
            .ok_or_else(|| TripError::InvalidState("completed trip has no driver".to_string()))?;

        let rating = Rating::new(trip_id, actor.id, driver_id, score, request.comment);
        self.ratings.insert_rating(&rating).await?;
        info!(%trip_id, driver_id, score, "Trip rated");
        Ok(rating)
    }

    /// Passenger-triggered rematch of a trip left SEARCHING.
    pub async fn retry_matching(&self, actor: &AuthUser, trip_id: Uuid) -> TripResult<Trip> {
        let trip = self.load(trip_id).await?;
        machine::ensure_owner(&trip, actor)?;
        if trip.status != TripStatus::Searching {
            return Err(TripError::InvalidState(format!(
                "cannot rematch a trip that is {}",
                trip.status
            )));
        }
        self.match_driver(trip).await
    }

    /// Expire every assignment whose persisted deadline has passed.
    /// Returns how many were released.
    pub async fn sweep_expired_assignments(&self) -> TripResult<usize> {
        let due = self
            .trips
            .list_expired_assignments(Utc::now(), self.settings.sweep_batch)
            .await?;
        let mut released = 0;
        for trip in due {
            let Some(driver_id) = trip.driver_id else {
                continue;
            };
            match self.expire_assignment(trip.id, driver_id).await {
                Ok(Some(_)) => released += 1,
                Ok(None) => {}
                Err(e) => warn!(trip_id = %trip.id, "Failed to expire assignment: {}", e),
            }
        }
        Ok(released)
    }

    async fn advance(&self, actor: &AuthUser, trip_id: Uuid, action: TripAction) -> TripResult<Trip> {
        let trip = self.load(trip_id).await?;
        let transition = self.plan_driver_step(&trip, actor, action).await?;
        let updated = self.apply(trip_id, transition, action).await?;

        info!(%trip_id, driver_id = actor.id, status = %updated.status, "Trip advanced");
        self.dispatcher
            .notify(updated.passenger_id, TripEventKind::TripUpdate, &updated);
        Ok(updated)
    }

    /// A driver the ledger already released from this trip is answering an
    /// offer that is gone, which is `InvalidState` rather than `Forbidden`.
    async fn plan_driver_step(&self, trip: &Trip, actor: &AuthUser, action: TripAction) -> TripResult<Transition> {
        match machine::plan(trip, actor, action) {
            Err(TripError::Forbidden(reason)) if actor.role == Role::Driver => {
                if self.ledger.list_excluded(trip.id).await?.contains(&actor.id) {
                    debug!(trip_id = %trip.id, driver_id = actor.id, action = action.as_str(), "Stale driver response");
                    Err(TripError::InvalidState("offer no longer pending".to_string()))
                } else {
                    Err(TripError::Forbidden(reason))
                }
            }
            planned => planned,
        }
    }

    /// Look for a driver and assign the nearest eligible one.
    ///
    /// Losing the assignment race is not an error: the trip is reloaded and
    /// returned as it now stands.
    async fn match_driver(&self, trip: Trip) -> TripResult<Trip> {
        let Some(candidate) = self.matcher.find_candidate(&trip).await? else {
            return Ok(trip);
        };

        let deadline = self.supervisor.deadline(Utc::now())?;
        let transition = machine::plan_assignment(&trip, candidate.driver_id, deadline)?;
        let Some(assigned) = self
            .trips
            .transition(trip.id, transition.guard, transition.change)
            .await?
        else {
            debug!(trip_id = %trip.id, "Trip changed during matching");
            return self.load(trip.id).await;
        };

        self.supervisor.arm(assigned.id, candidate.driver_id);
        info!(
            trip_id = %assigned.id,
            driver_id = candidate.driver_id,
            distance = candidate.distance,
            "Driver assigned"
        );
        self.dispatcher
            .notify(candidate.driver_id, TripEventKind::TripRequest, &assigned);
        self.dispatcher
            .notify(assigned.passenger_id, TripEventKind::TripUpdate, &assigned);
        Ok(assigned)
    }

    /// Record the exclusion, then conditionally hand the trip back to SEARCHING.
    async fn release(&self, trip: &Trip, driver_id: UserId, reason: RejectionReason) -> TripResult<Option<Trip>> {
        let Some(transition) = machine::plan_release(trip, driver_id) else {
            return Ok(None);
        };
        self.ledger.record(trip.id, driver_id, reason).await?;
        Ok(self
            .trips
            .transition(trip.id, transition.guard, transition.change)
            .await?)
    }

    async fn apply(&self, trip_id: Uuid, transition: Transition, action: TripAction) -> TripResult<Trip> {
        self.trips
            .transition(trip_id, transition.guard, transition.change)
            .await?
            .ok_or_else(|| TripError::InvalidState(format!("trip changed before {} could apply", action.as_str())))
    }

    async fn load(&self, trip_id: Uuid) -> TripResult<Trip> {
        self.trips
            .get_trip(trip_id)
            .await?
            .ok_or(TripError::NotFound(trip_id))
    }
}
