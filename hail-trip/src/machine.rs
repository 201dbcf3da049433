//! Transition rules for the trip lifecycle.
//!
//! Planning is pure: each function inspects a snapshot of the trip and
//! returns the guard a conditional update must still observe together with
//! the values it writes. Nothing here touches storage.

use chrono::{DateTime, Utc};
use hail_core::repository::{TripChange, TripGuard};
use hail_core::{AuthUser, Role, Trip, TripStatus};
use hail_shared::UserId;

use crate::error::{TripError, TripResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripAction {
    Accept,
    Reject,
    Start,
    Complete,
    Cancel,
}

impl TripAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripAction::Accept => "accept",
            TripAction::Reject => "reject",
            TripAction::Start => "start",
            TripAction::Complete => "complete",
            TripAction::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub guard: TripGuard,
    pub change: TripChange,
}

/// Plan a driver or passenger action against the current trip snapshot.
///
/// Driver actions check the status before the caller; cancel checks
/// ownership before the status.
pub fn plan(trip: &Trip, actor: &AuthUser, action: TripAction) -> TripResult<Transition> {
    match action {
        TripAction::Accept => driver_step(trip, actor, action, TripStatus::DriverFound, TripStatus::Accepted),
        TripAction::Reject => driver_step(trip, actor, action, TripStatus::DriverFound, TripStatus::Searching),
        TripAction::Start => driver_step(trip, actor, action, TripStatus::Accepted, TripStatus::InProgress),
        TripAction::Complete => driver_step(trip, actor, action, TripStatus::InProgress, TripStatus::Completed),
        TripAction::Cancel => {
            ensure_owner(trip, actor)?;
            match trip.status {
                TripStatus::Searching | TripStatus::DriverFound | TripStatus::Accepted => Ok(Transition {
                    guard: TripGuard::of(trip),
                    change: TripChange {
                        status: TripStatus::Cancelled,
                        driver_id: None,
                        assignment_expires_at: None,
                    },
                }),
                status => Err(TripError::InvalidState(format!("cannot cancel a trip that is {}", status))),
            }
        }
    }
}

fn driver_step(
    trip: &Trip,
    actor: &AuthUser,
    action: TripAction,
    from: TripStatus,
    to: TripStatus,
) -> TripResult<Transition> {
    if trip.status != from {
        return Err(TripError::InvalidState(format!(
            "cannot {} a trip that is {}",
            action.as_str(),
            trip.status
        )));
    }
    if actor.role != Role::Driver || !trip.is_assigned_to(actor.id) {
        return Err(TripError::Forbidden("driver is not assigned to this trip".to_string()));
    }

    // Reject hands the trip back to matching; the other steps keep the driver.
    let driver_id = if to == TripStatus::Searching { None } else { trip.driver_id };
    Ok(Transition {
        guard: TripGuard::of(trip),
        change: TripChange {
            status: to,
            driver_id,
            assignment_expires_at: None,
        },
    })
}

/// SEARCHING with no driver → DRIVER_FOUND for `driver_id`.
pub fn plan_assignment(trip: &Trip, driver_id: UserId, expires_at: DateTime<Utc>) -> TripResult<Transition> {
    if trip.status != TripStatus::Searching || trip.driver_id.is_some() {
        return Err(TripError::InvalidState(format!(
            "cannot assign a driver to a trip that is {}",
            trip.status
        )));
    }
    Ok(Transition {
        guard: TripGuard {
            status: TripStatus::Searching,
            driver_id: None,
        },
        change: TripChange {
            status: TripStatus::DriverFound,
            driver_id: Some(driver_id),
            assignment_expires_at: Some(expires_at),
        },
    })
}

/// Release of an assignment that belongs to `driver_id`, used for both
/// reject and timeout. `None` when the trip has moved on.
pub fn plan_release(trip: &Trip, driver_id: UserId) -> Option<Transition> {
    if trip.status != TripStatus::DriverFound || !trip.is_assigned_to(driver_id) {
        return None;
    }
    Some(Transition {
        guard: TripGuard {
            status: TripStatus::DriverFound,
            driver_id: Some(driver_id),
        },
        change: TripChange {
            status: TripStatus::Searching,
            driver_id: None,
            assignment_expires_at: None,
        },
    })
}

pub fn ensure_owner(trip: &Trip, actor: &AuthUser) -> TripResult<()> {
    if actor.role != Role::Passenger || trip.passenger_id != actor.id {
        return Err(TripError::Forbidden("trip belongs to another passenger".to_string()));
    }
    Ok(())
}

/// Passengers see their own trips, drivers the trips assigned to them.
pub fn ensure_can_view(trip: &Trip, actor: &AuthUser) -> TripResult<()> {
    let allowed = match actor.role {
        Role::Passenger => trip.passenger_id == actor.id,
        Role::Driver => trip.is_assigned_to(actor.id),
    };
    if !allowed {
        return Err(TripError::Forbidden("not a participant of this trip".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hail_shared::Coordinates;
    use rust_decimal::Decimal;

    fn trip_in(status: TripStatus, driver_id: Option<UserId>) -> Trip {
        let mut trip = Trip::new(
            1,
            Coordinates::new(10.77, 106.70),
            Coordinates::new(10.78, 106.80),
            Decimal::new(5_000_000, 2),
        );
        trip.status = status;
        trip.driver_id = driver_id;
        if status == TripStatus::DriverFound {
            trip.assignment_expires_at = Some(Utc::now());
        }
        trip
    }

    #[test]
    fn test_accept_moves_to_accepted_and_clears_deadline() {
        let trip = trip_in(TripStatus::DriverFound, Some(7));
        let t = plan(&trip, &AuthUser::driver(7), TripAction::Accept).unwrap();
        assert_eq!(t.guard.status, TripStatus::DriverFound);
        assert_eq!(t.guard.driver_id, Some(7));
        assert_eq!(t.change.status, TripStatus::Accepted);
        assert_eq!(t.change.driver_id, Some(7));
        assert!(t.change.assignment_expires_at.is_none());
    }

    #[test]
    fn test_second_accept_is_invalid_state() {
        let trip = trip_in(TripStatus::Accepted, Some(7));
        let err = plan(&trip, &AuthUser::driver(7), TripAction::Accept).unwrap_err();
        assert!(matches!(err, TripError::InvalidState(_)));
    }

    #[test]
    fn test_driver_steps_check_status_before_caller() {
        let trip = trip_in(TripStatus::Searching, None);
        let err = plan(&trip, &AuthUser::driver(99), TripAction::Start).unwrap_err();
        assert!(matches!(err, TripError::InvalidState(_)));

        let trip = trip_in(TripStatus::Accepted, Some(7));
        let err = plan(&trip, &AuthUser::driver(99), TripAction::Start).unwrap_err();
        assert!(matches!(err, TripError::Forbidden(_)));
    }

    #[test]
    fn test_reject_clears_driver() {
        let trip = trip_in(TripStatus::DriverFound, Some(7));
        let t = plan(&trip, &AuthUser::driver(7), TripAction::Reject).unwrap();
        assert_eq!(t.change.status, TripStatus::Searching);
        assert!(t.change.driver_id.is_none());
    }

    #[test]
    fn test_cancel_checks_ownership_before_status() {
        let trip = trip_in(TripStatus::Completed, Some(7));
        let err = plan(&trip, &AuthUser::passenger(2), TripAction::Cancel).unwrap_err();
        assert!(matches!(err, TripError::Forbidden(_)));

        let err = plan(&trip, &AuthUser::passenger(1), TripAction::Cancel).unwrap_err();
        assert!(matches!(err, TripError::InvalidState(_)));
    }

    #[test]
    fn test_cancel_accepted_trip_clears_driver() {
        let trip = trip_in(TripStatus::Accepted, Some(7));
        let t = plan(&trip, &AuthUser::passenger(1), TripAction::Cancel).unwrap();
        assert_eq!(t.change.status, TripStatus::Cancelled);
        assert!(t.change.driver_id.is_none());
        assert_eq!(t.guard.driver_id, Some(7));
    }

    #[test]
    fn test_in_progress_trip_cannot_be_cancelled() {
        let trip = trip_in(TripStatus::InProgress, Some(7));
        let err = plan(&trip, &AuthUser::passenger(1), TripAction::Cancel).unwrap_err();
        assert!(matches!(err, TripError::InvalidState(_)));
    }

    #[test]
    fn test_release_only_for_current_assignment() {
        let trip = trip_in(TripStatus::DriverFound, Some(7));
        assert!(plan_release(&trip, 8).is_none());
        assert!(plan_release(&trip, 7).is_some());

        let accepted = trip_in(TripStatus::Accepted, Some(7));
        assert!(plan_release(&accepted, 7).is_none());
    }

    #[test]
    fn test_assignment_requires_searching() {
        let trip = trip_in(TripStatus::Searching, None);
        let t = plan_assignment(&trip, 3, Utc::now()).unwrap();
        assert_eq!(t.change.status, TripStatus::DriverFound);
        assert_eq!(t.change.driver_id, Some(3));
        assert!(t.change.assignment_expires_at.is_some());

        let cancelled = trip_in(TripStatus::Cancelled, None);
        assert!(plan_assignment(&cancelled, 3, Utc::now()).is_err());
    }

    #[test]
    fn test_view_permissions() {
        let trip = trip_in(TripStatus::Accepted, Some(7));
        assert!(ensure_can_view(&trip, &AuthUser::passenger(1)).is_ok());
        assert!(ensure_can_view(&trip, &AuthUser::driver(7)).is_ok());
        assert!(ensure_can_view(&trip, &AuthUser::driver(8)).is_err());
        assert!(ensure_can_view(&trip, &AuthUser::passenger(2)).is_err());
    }
}
