//! In-memory reservation repository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::entitlement::{Reservation, ReservationState, StoreError};
use crate::domain::foundation::{ReservationId, StateMachine, Timestamp};
use crate::ports::{ReservationRepository, SettleOutcome};

/// Mutex-guarded map of reservations.
#[derive(Debug, Default)]
pub struct InMemoryReservationRepository {
    reservations: Mutex<HashMap<ReservationId, Reservation>>,
}

impl InMemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reservations not yet committed or released.
    pub async fn unsettled_count(&self) -> usize {
        self.reservations
            .lock()
            .await
            .values()
            .filter(|r| r.is_unsettled())
            .count()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut reservations = self.reservations.lock().await;
        if reservations.contains_key(&reservation.id) {
            return Err(StoreError::corrupt(format!(
                "duplicate reservation id {}",
                reservation.id
            )));
        }
        reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn find(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservations.lock().await.get(id).cloned())
    }

    async fn settle(
        &self,
        id: &ReservationId,
        target: ReservationState,
        at: Timestamp,
    ) -> Result<SettleOutcome, StoreError> {
        let mut reservations = self.reservations.lock().await;
        let Some(reservation) = reservations.get_mut(id) else {
            return Ok(SettleOutcome::NotFound);
        };
        if !reservation.state.can_transition_to(&target) {
            return Ok(SettleOutcome::AlreadySettled(reservation.state));
        }
        reservation
            .settle(target, at)
            .map_err(|e| StoreError::corrupt(e.to_string()))?;
        Ok(SettleOutcome::Settled(reservation.clone()))
    }

    async fn list_expired(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Reservation>, StoreError> {
        let reservations = self.reservations.lock().await;
        let mut expired: Vec<Reservation> = reservations
            .values()
            .filter(|r| r.is_expired(&cutoff))
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.created_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;

    fn pending() -> Reservation {
        Reservation::pending(UserId::new("u1").unwrap(), true)
    }

    #[tokio::test]
    async fn settle_moves_pending_once() {
        let repo = InMemoryReservationRepository::new();
        let reservation = pending();
        repo.insert(&reservation).await.unwrap();

        let first = repo
            .settle(&reservation.id, ReservationState::Committed, Timestamp::now())
            .await
            .unwrap();
        assert!(matches!(first, SettleOutcome::Settled(r) if r.state == ReservationState::Committed));

        let second = repo
            .settle(&reservation.id, ReservationState::Released, Timestamp::now())
            .await
            .unwrap();
        assert_eq!(second, SettleOutcome::AlreadySettled(ReservationState::Committed));
    }

    #[tokio::test]
    async fn releasing_can_only_finish_as_released() {
        let repo = InMemoryReservationRepository::new();
        let reservation = pending();
        repo.insert(&reservation).await.unwrap();
        repo.settle(&reservation.id, ReservationState::Releasing, Timestamp::now())
            .await
            .unwrap();

        let again = repo
            .settle(&reservation.id, ReservationState::Releasing, Timestamp::now())
            .await
            .unwrap();
        assert_eq!(again, SettleOutcome::AlreadySettled(ReservationState::Releasing));
        let commit = repo
            .settle(&reservation.id, ReservationState::Committed, Timestamp::now())
            .await
            .unwrap();
        assert_eq!(commit, SettleOutcome::AlreadySettled(ReservationState::Releasing));

        let done = repo
            .settle(&reservation.id, ReservationState::Released, Timestamp::now())
            .await
            .unwrap();
        assert!(matches!(done, SettleOutcome::Settled(r) if r.state == ReservationState::Released));
        assert_eq!(repo.unsettled_count().await, 0);
    }

    #[tokio::test]
    async fn settle_unknown_id_is_not_found() {
        let repo = InMemoryReservationRepository::new();
        let outcome = repo
            .settle(&ReservationId::new(), ReservationState::Released, Timestamp::now())
            .await
            .unwrap();
        assert_eq!(outcome, SettleOutcome::NotFound);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let repo = InMemoryReservationRepository::new();
        let reservation = pending();
        repo.insert(&reservation).await.unwrap();
        assert!(repo.insert(&reservation).await.is_err());
    }

    #[tokio::test]
    async fn list_expired_returns_oldest_pending_first() {
        let repo = InMemoryReservationRepository::new();
        let now = Timestamp::now();

        let mut older = pending();
        older.created_at = now.minus_secs(3_600);
        let mut old = pending();
        old.created_at = now.minus_secs(1_200);
        let fresh = pending();
        let mut settled = pending();
        settled.created_at = now.minus_secs(7_200);
        settled
            .settle(ReservationState::Committed, now)
            .unwrap();

        for r in [&older, &old, &fresh, &settled] {
            repo.insert(r).await.unwrap();
        }

        let expired = repo.list_expired(now.minus_secs(900), 10).await.unwrap();
        let ids: Vec<_> = expired.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![older.id, old.id]);

        let mut stuck = pending();
        stuck.created_at = now.minus_secs(2_000);
        repo.insert(&stuck).await.unwrap();
        repo.settle(&stuck.id, ReservationState::Releasing, now)
            .await
            .unwrap();
        let expired = repo.list_expired(now.minus_secs(900), 10).await.unwrap();
        let ids: Vec<_> = expired.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![older.id, stuck.id, old.id]);

        let limited = repo.list_expired(now.minus_secs(900), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, older.id);
    }
}
