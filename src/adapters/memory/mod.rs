//! In-memory adapters for the ledger ports.
//!
//! Used when no database URL is configured and throughout the test suite.

mod entitlement_store;
mod reservation_repository;

pub use entitlement_store::InMemoryEntitlementStore;
pub use reservation_repository::InMemoryReservationRepository;
