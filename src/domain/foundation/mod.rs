//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the state machine trait, and validation
//! errors that form the vocabulary of the ledger domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{EventId, ReservationId, UserId, REFUND_EVENT_PREFIX};
pub use state_machine::{InvalidTransition, StateMachine};
pub use timestamp::Timestamp;
