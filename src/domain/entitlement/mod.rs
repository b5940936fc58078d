//! Entitlement domain - credits, tiers, and the rules that move them.
//!
//! # Module Structure
//!
//! - `tier` / `record` - Per-user entitlement state
//! - `event_type` - Closed set of entitlement-affecting events
//! - `state_machine` - Pure transitions for events and adjustments
//! - `reservation` - Access reservation lifecycle
//! - `webhook_verifier` / `webhook_payload` - Inbound delivery handling
//! - `errors` / `webhook_errors` - Error taxonomy

mod errors;
mod event_type;
mod record;
mod reservation;
pub mod state_machine;
mod tier;
mod webhook_errors;
mod webhook_payload;
pub mod webhook_verifier;

pub use errors::{AccessError, DenialReason, StoreError};
pub use event_type::{
    EntitlementEventType, ORDER_CREATED, SUBSCRIPTION_CANCELLED, SUBSCRIPTION_CREATED,
};
pub use record::EntitlementRecord;
pub use reservation::{Reservation, ReservationState};
pub use state_machine::AdjustmentError;
pub use tier::Tier;
pub use webhook_errors::WebhookError;
pub use webhook_payload::WebhookEvent;
pub use webhook_verifier::SignatureVerifier;
