pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod machine;
pub mod matching;
pub mod memory;
pub mod service;
pub mod supervisor;

pub use dispatcher::{DispatchWorker, NotificationDispatcher};
pub use error::{TripError, TripResult};
pub use ledger::RejectionLedger;
pub use matching::{Matcher, MatchingSettings};
pub use memory::{InMemoryDriverIndex, InMemoryStore};
pub use service::{DispatchSettings, RatingRequest, TripRequest, TripService, TripServiceParts};
pub use supervisor::{AssignmentExpiry, TimeoutSupervisor};
