//! PostgreSQL implementation of ReservationRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entitlement::{Reservation, ReservationState, StoreError};
use crate::domain::foundation::{ReservationId, Timestamp, UserId};
use crate::ports::{ReservationRepository, SettleOutcome};

/// PostgreSQL implementation of the ReservationRepository port.
#[derive(Clone)]
pub struct PostgresReservationRepository {
    pool: PgPool,
}

impl PostgresReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a reservation.
#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    user_id: String,
    debited: bool,
    state: String,
    created_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: ReservationId::from_uuid(row.id),
            user_id: UserId::new(row.user_id)
                .map_err(|e| StoreError::corrupt(format!("Invalid user_id: {}", e)))?,
            debited: row.debited,
            state: parse_state(&row.state)?,
            created_at: Timestamp::from_datetime(row.created_at),
            settled_at: row.settled_at.map(Timestamp::from_datetime),
        })
    }
}

fn parse_state(s: &str) -> Result<ReservationState, StoreError> {
    s.parse::<ReservationState>()
        .map_err(|e| StoreError::corrupt(e.to_string()))
}

fn db_error(context: &str, e: sqlx::Error) -> StoreError {
    StoreError::unavailable(format!("{}: {}", context, e))
}

#[async_trait]
impl ReservationRepository for PostgresReservationRepository {
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO access_reservations (id, user_id, debited, state, created_at, settled_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.user_id.as_str())
        .bind(reservation.debited)
        .bind(reservation.state.as_str())
        .bind(reservation.created_at.as_datetime())
        .bind(reservation.settled_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert reservation", e))?;

        Ok(())
    }

    async fn find(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, debited, state, created_at, settled_at
            FROM access_reservations
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find reservation", e))?;

        row.map(Reservation::try_from).transpose()
    }

    async fn settle(
        &self,
        id: &ReservationId,
        target: ReservationState,
        at: Timestamp,
    ) -> Result<SettleOutcome, StoreError> {
        let sources: Vec<&str> = ReservationState::sources_of(target)
            .iter()
            .map(ReservationState::as_str)
            .collect();
        let settled: Option<ReservationRow> = sqlx::query_as(
            r#"
            UPDATE access_reservations SET
                state = $2,
                settled_at = $3
            WHERE id = $1 AND state = ANY($4)
            RETURNING id, user_id, debited, state, created_at, settled_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(target.as_str())
        .bind(at.as_datetime())
        .bind(sources)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to settle reservation", e))?;

        if let Some(row) = settled {
            return Ok(SettleOutcome::Settled(Reservation::try_from(row)?));
        }

        match self.find(id).await? {
            Some(existing) => Ok(SettleOutcome::AlreadySettled(existing.state)),
            None => Ok(SettleOutcome::NotFound),
        }
    }

    async fn list_expired(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, debited, state, created_at, settled_at
            FROM access_reservations
            WHERE state IN ('pending', 'releasing') AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list expired reservations", e))?;

        rows.into_iter().map(Reservation::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(state: &str) -> ReservationRow {
        ReservationRow {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            debited: true,
            state: state.to_string(),
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    #[test]
    fn row_converts_to_reservation() {
        let source = row("pending");
        let id = source.id;
        let reservation = Reservation::try_from(source).unwrap();
        assert_eq!(*reservation.id.as_uuid(), id);
        assert!(reservation.is_pending());
        assert!(reservation.debited);
    }

    #[test]
    fn releasing_row_is_unsettled() {
        let reservation = Reservation::try_from(row("releasing")).unwrap();
        assert_eq!(reservation.state, ReservationState::Releasing);
        assert!(reservation.is_unsettled());
    }

    #[test]
    fn unknown_state_is_corrupt() {
        assert!(matches!(
            Reservation::try_from(row("expired")),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn blank_user_is_corrupt() {
        let mut source = row("committed");
        source.user_id = String::new();
        assert!(Reservation::try_from(source).is_err());
    }
}
