//! Entitlement Ledger - Credit and subscription gating for a metered operation
//!
//! Payment webhooks are verified, deduplicated and applied to per-user
//! entitlement records; an access gate reserves a credit before the metered
//! operation runs and settles it afterwards.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
