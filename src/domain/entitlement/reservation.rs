//! Access reservations: short-lived claims on one credit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    InvalidTransition, ReservationId, StateMachine, Timestamp, UserId, ValidationError,
};

/// Lifecycle of a reservation. Exactly one settlement per reservation.
///
/// `Releasing` marks a release whose refund has not been confirmed yet; it is
/// resumed by a retried release or by the sweeper, never committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Pending,
    Releasing,
    Committed,
    Released,
}

impl ReservationState {
    pub const ALL: [ReservationState; 4] = [
        ReservationState::Pending,
        ReservationState::Releasing,
        ReservationState::Committed,
        ReservationState::Released,
    ];

    /// States from which `target` can be reached in one step.
    pub fn sources_of(target: ReservationState) -> Vec<ReservationState> {
        Self::ALL
            .into_iter()
            .filter(|state| state.can_transition_to(&target))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Pending => "pending",
            ReservationState::Releasing => "releasing",
            ReservationState::Committed => "committed",
            ReservationState::Released => "released",
        }
    }
}

impl StateMachine for ReservationState {
    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            ReservationState::Pending => vec![
                ReservationState::Committed,
                ReservationState::Releasing,
                ReservationState::Released,
            ],
            ReservationState::Releasing => vec![ReservationState::Released],
            ReservationState::Committed | ReservationState::Released => vec![],
        }
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationState::Pending),
            "releasing" => Ok(ReservationState::Releasing),
            "committed" => Ok(ReservationState::Committed),
            "released" => Ok(ReservationState::Released),
            other => Err(ValidationError::invalid_format(
                "reservation_state",
                format!("unknown state '{}'", other),
            )),
        }
    }
}

/// A claim on one metered operation for `user_id`.
///
/// `debited` records whether a credit was actually taken at reserve time;
/// pro-tier reservations are never debited, so releasing them refunds nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub debited: bool,
    pub state: ReservationState,
    pub created_at: Timestamp,
    pub settled_at: Option<Timestamp>,
}

impl Reservation {
    /// Creates a new pending reservation.
    pub fn pending(user_id: UserId, debited: bool) -> Self {
        Self {
            id: ReservationId::new(),
            user_id,
            debited,
            state: ReservationState::Pending,
            created_at: Timestamp::now(),
            settled_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == ReservationState::Pending
    }

    /// True until committed or released.
    pub fn is_unsettled(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Moves the reservation along its lifecycle.
    pub fn settle(
        &mut self,
        target: ReservationState,
        at: Timestamp,
    ) -> Result<(), InvalidTransition<ReservationState>> {
        self.state = self.state.transition_to(target)?;
        self.settled_at = Some(at);
        Ok(())
    }

    /// True if unsettled and created strictly before `cutoff`.
    pub fn is_expired(&self, cutoff: &Timestamp) -> bool {
        self.is_unsettled() && self.created_at.is_before(cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[test]
    fn new_reservation_is_pending() {
        let reservation = Reservation::pending(user(), true);
        assert!(reservation.is_pending());
        assert!(reservation.debited);
        assert!(reservation.settled_at.is_none());
    }

    #[test]
    fn pending_settles_once() {
        let mut reservation = Reservation::pending(user(), true);
        reservation
            .settle(ReservationState::Released, Timestamp::now())
            .unwrap();
        assert_eq!(reservation.state, ReservationState::Released);
        assert!(reservation.settled_at.is_some());

        let err = reservation
            .settle(ReservationState::Released, Timestamp::now())
            .unwrap_err();
        assert_eq!(err.from, ReservationState::Released);
    }

    #[test]
    fn committed_cannot_be_released() {
        let mut reservation = Reservation::pending(user(), false);
        reservation
            .settle(ReservationState::Committed, Timestamp::now())
            .unwrap();
        assert!(reservation
            .settle(ReservationState::Released, Timestamp::now())
            .is_err());
    }

    #[test]
    fn releasing_only_finishes_as_released() {
        let mut reservation = Reservation::pending(user(), true);
        reservation
            .settle(ReservationState::Releasing, Timestamp::now())
            .unwrap();
        assert!(reservation.is_unsettled());
        assert!(reservation
            .settle(ReservationState::Committed, Timestamp::now())
            .is_err());
        reservation
            .settle(ReservationState::Released, Timestamp::now())
            .unwrap();
        assert!(!reservation.is_unsettled());
    }

    #[test]
    fn sources_follow_transitions() {
        assert_eq!(
            ReservationState::sources_of(ReservationState::Released),
            vec![ReservationState::Pending, ReservationState::Releasing]
        );
        assert_eq!(
            ReservationState::sources_of(ReservationState::Releasing),
            vec![ReservationState::Pending]
        );
        assert_eq!(
            ReservationState::sources_of(ReservationState::Committed),
            vec![ReservationState::Pending]
        );
    }

    #[test]
    fn pending_cannot_transition_to_pending() {
        assert!(!ReservationState::Pending.can_transition_to(&ReservationState::Pending));
    }

    #[test]
    fn settled_states_are_terminal() {
        assert!(ReservationState::Committed.is_terminal());
        assert!(ReservationState::Released.is_terminal());
        assert!(!ReservationState::Pending.is_terminal());
        assert!(!ReservationState::Releasing.is_terminal());
    }

    #[test]
    fn expiry_only_applies_to_pending() {
        let mut reservation = Reservation::pending(user(), true);
        let future_cutoff = Timestamp::now();
        reservation.created_at = future_cutoff.minus_secs(600);
        assert!(reservation.is_expired(&future_cutoff));

        reservation
            .settle(ReservationState::Committed, Timestamp::now())
            .unwrap();
        assert!(!reservation.is_expired(&future_cutoff));

        let mut stuck = Reservation::pending(user(), true);
        stuck.created_at = future_cutoff.minus_secs(600);
        stuck
            .settle(ReservationState::Releasing, Timestamp::now())
            .unwrap();
        assert!(stuck.is_expired(&future_cutoff));
    }

    #[test]
    fn state_parses_from_storage_string() {
        for state in ReservationState::ALL {
            assert_eq!(state.as_str().parse::<ReservationState>().unwrap(), state);
        }
        assert!("settled".parse::<ReservationState>().is_err());
    }
}
