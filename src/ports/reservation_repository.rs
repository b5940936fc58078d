//! ReservationRepository port - Short-lived persistence for access reservations.

use async_trait::async_trait;

use crate::domain::entitlement::{Reservation, ReservationState, StoreError};
use crate::domain::foundation::{ReservationId, Timestamp};

/// Result of settling a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Moved from pending to the requested state.
    Settled(Reservation),
    /// Current state cannot move to the requested one; nothing changed.
    AlreadySettled(ReservationState),
    /// No reservation with that id.
    NotFound,
}

/// Port for storing reservations between reserve and commit/release.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Stores a new pending reservation.
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError>;

    /// Finds a reservation by id.
    async fn find(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Atomically moves a reservation to `target` if its current state is one
    /// of [`ReservationState::sources_of`] `target`.
    ///
    /// Two concurrent settlements of the same reservation to the same target
    /// must not both return `Settled`.
    async fn settle(
        &self,
        id: &ReservationId,
        target: ReservationState,
        at: Timestamp,
    ) -> Result<SettleOutcome, StoreError>;

    /// Lists unsettled (pending or releasing) reservations created before
    /// `cutoff`, oldest first.
    async fn list_expired(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Reservation>, StoreError>;
}
