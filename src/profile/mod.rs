//! User profile persistence: users, facts, the HITL confirmation queue,
//! and the voice transcript log.

pub mod routing;
pub mod schema;
pub mod store;
pub mod types;

pub use routing::route_candidates;
pub use store::{ConfirmationParams, ProfileStore};
pub use types::{
    ConfirmationStatus, Fact, FactCandidate, FactKind, FactStatus, PendingConfirmation,
    RoutingReport, TranscriptEntry, UserRecord,
};
