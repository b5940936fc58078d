//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, state machine trait)
//! - `entitlement` - Credits, tiers, reservations, and webhook verification

pub mod entitlement;
pub mod foundation;
