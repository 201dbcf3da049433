use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UserId;

/// Event names understood by connected rider and driver clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TripEventKind {
    /// A driver has been offered a trip and must accept or reject it.
    #[serde(rename = "trip:request")]
    TripRequest,
    /// Any other change a participant can see.
    #[serde(rename = "trip:update")]
    TripUpdate,
}

impl TripEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripEventKind::TripRequest => "trip:request",
            TripEventKind::TripUpdate => "trip:update",
        }
    }
}

impl fmt::Display for TripEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message addressed to a single user's real-time session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub event: TripEventKind,
    pub trip_id: Uuid,
    pub payload: serde_json::Value,
    pub timestamp: i64,
}

impl Notification {
    pub fn new(user_id: UserId, event: TripEventKind, trip_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            user_id,
            event,
            trip_id,
            payload,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Channel name the notification is published on (`user:{id}`).
    pub fn channel(&self) -> String {
        format!("user:{}", self.user_id)
    }
}
