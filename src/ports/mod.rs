//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Ledger Ports
//!
//! - `EntitlementStore` - Atomic per-user record persistence
//! - `EventDeduplicator` - Processed webhook event tracking
//! - `ReservationRepository` - Pending access reservations
//!
//! ## External Services
//!
//! - `ContentAnalyzer` - The metered analysis operation

mod content_analyzer;
mod entitlement_store;
mod event_deduplicator;
mod reservation_repository;

pub use content_analyzer::{AnalysisRequest, AnalyzerError, ContentAnalyzer};
pub use entitlement_store::{ApplyOutcome, CasOutcome, EntitlementStore};
pub use event_deduplicator::{EventDeduplicator, MarkOutcome};
pub use reservation_repository::{ReservationRepository, SettleOutcome};
