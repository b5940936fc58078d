//! PostgreSQL adapters - Database implementations of the ledger ports.
//!
//! - `PostgresEntitlementStore` - Entitlement rows plus the processed-event set
//! - `PostgresReservationRepository` - Access reservations

mod entitlement_store;
mod reservation_repository;

pub use entitlement_store::PostgresEntitlementStore;
pub use reservation_repository::PostgresReservationRepository;
