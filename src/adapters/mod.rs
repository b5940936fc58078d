//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `analyzer` - Content analysis service (HTTP, mock)
//! - `http` - REST API (axum)
//! - `jobs` - Background reclamation
//! - `memory` - In-process stores for development and tests
//! - `postgres` - PostgreSQL persistence

pub mod analyzer;
pub mod http;
pub mod jobs;
pub mod memory;
pub mod postgres;

pub use analyzer::{HttpAnalyzerConfig, HttpContentAnalyzer, MockContentAnalyzer};
pub use jobs::{ReservationSweeper, ReservationSweeperConfig, SweepReport};
pub use memory::{InMemoryEntitlementStore, InMemoryReservationRepository};
pub use postgres::{PostgresEntitlementStore, PostgresReservationRepository};
