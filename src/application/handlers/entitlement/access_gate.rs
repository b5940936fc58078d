//! AccessGate - Reserve/commit/release protocol for the metered operation.
//!
//! A credit is debited eagerly at `reserve` time with a version-checked
//! compare-and-swap, so a burst of concurrent requests from one user cannot
//! run the costly operation more often than the balance allows.
//!
//! Release is two-phase: the reservation moves to `Releasing`, the credit is
//! refunded through the store's idempotent event path, and only then does it
//! become `Released`. A failed refund leaves it `Releasing` for a later
//! release call or the sweeper to finish.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `max_cas_attempts` | 8 | CAS attempts before reporting contention |
//! | `reserve_timeout` | 2s | Overall deadline for one `reserve` call |
//! | `base_backoff` | 1ms | First backoff after a CAS conflict |
//! | `max_backoff` | 16ms | Backoff cap |

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::domain::entitlement::{
    state_machine, AccessError, DenialReason, EntitlementEventType, EntitlementRecord,
    Reservation, ReservationState,
};
use crate::domain::foundation::{EventId, ReservationId, Timestamp, UserId};
use crate::ports::{
    ApplyOutcome, CasOutcome, EntitlementStore, ReservationRepository, SettleOutcome,
};

/// Configuration for the AccessGate.
#[derive(Debug, Clone)]
pub struct AccessGateConfig {
    /// Compare-and-swap attempts per reserve before reporting contention.
    pub max_cas_attempts: u32,

    /// Deadline for a whole reserve call, checked between attempts.
    pub reserve_timeout: Duration,

    /// Backoff after the first conflict; doubles per attempt.
    pub base_backoff: Duration,

    /// Upper bound on a single backoff.
    pub max_backoff: Duration,
}

impl Default for AccessGateConfig {
    fn default() -> Self {
        Self {
            max_cas_attempts: 8,
            reserve_timeout: Duration::from_millis(2_000),
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(16),
        }
    }
}

impl AccessGateConfig {
    pub fn with_max_cas_attempts(mut self, attempts: u32) -> Self {
        self.max_cas_attempts = attempts.max(1);
        self
    }

    pub fn with_reserve_timeout(mut self, timeout: Duration) -> Self {
        self.reserve_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max.max(base);
        self
    }

    /// Backoff before attempt `attempt + 1`.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Gate in front of the metered operation.
pub struct AccessGate {
    store: Arc<dyn EntitlementStore>,
    reservations: Arc<dyn ReservationRepository>,
    config: AccessGateConfig,
}

impl AccessGate {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        reservations: Arc<dyn ReservationRepository>,
        config: AccessGateConfig,
    ) -> Self {
        Self {
            store,
            reservations,
            config,
        }
    }

    /// Claims one metered operation for `user_id`.
    ///
    /// Pro users get a reservation without a debit. Free users with credit are
    /// debited by one. Otherwise returns `AccessError::Denied`.
    pub async fn reserve(&self, user_id: &UserId) -> Result<Reservation, AccessError> {
        let debited = self.debit(user_id).await?;
        let reservation = Reservation::pending(user_id.clone(), debited);

        if let Err(e) = self.reservations.insert(&reservation).await {
            error!(
                user_id = %user_id,
                reservation_id = %reservation.id,
                error = %e,
                "Failed to persist reservation, returning credit"
            );
            if debited {
                if let Err(refund_err) = self.refund(user_id, &reservation.id).await {
                    error!(
                        user_id = %user_id,
                        reservation_id = %reservation.id,
                        error = %refund_err,
                        "Compensating refund failed"
                    );
                }
            }
            return Err(e.into());
        }

        info!(
            user_id = %user_id,
            reservation_id = %reservation.id,
            debited,
            "Access reserved"
        );
        Ok(reservation)
    }

    /// Finalizes a reservation. The credit was already spent at reserve time.
    pub async fn commit(&self, id: &ReservationId) -> Result<Reservation, AccessError> {
        let reservation = self.settle(id, ReservationState::Committed).await?;
        info!(
            user_id = %reservation.user_id,
            reservation_id = %id,
            "Reservation committed"
        );
        Ok(reservation)
    }

    /// Abandons a reservation and returns its credit, if one was debited.
    ///
    /// The reservation stays `Releasing` until the refund is confirmed. If the
    /// refund fails, calling `release` again resumes it; the refund is keyed
    /// by the reservation id and never applied twice.
    pub async fn release(&self, id: &ReservationId) -> Result<Reservation, AccessError> {
        let outcome = self
            .reservations
            .settle(id, ReservationState::Releasing, Timestamp::now())
            .await?;
        let releasing = match outcome {
            SettleOutcome::AlreadySettled(ReservationState::Releasing) => {
                debug!(reservation_id = %id, "Resuming interrupted release");
                self.reservations
                    .find(id)
                    .await?
                    .ok_or(AccessError::ReservationNotFound(*id))?
            }
            outcome => settled(id, ReservationState::Releasing, outcome)?,
        };

        if releasing.debited {
            self.refund(&releasing.user_id, id).await?;
        }

        let released = self.settle(id, ReservationState::Released).await?;
        info!(
            user_id = %released.user_id,
            reservation_id = %id,
            refunded = released.debited,
            "Reservation released"
        );
        Ok(released)
    }

    async fn settle(
        &self,
        id: &ReservationId,
        target: ReservationState,
    ) -> Result<Reservation, AccessError> {
        let outcome = self.reservations.settle(id, target, Timestamp::now()).await?;
        settled(id, target, outcome)
    }

    /// Read-decrement-CAS cycle. Returns whether a credit was taken.
    async fn debit(&self, user_id: &UserId) -> Result<bool, AccessError> {
        let started = Instant::now();
        let mut record = self.store.read(user_id).await?;

        for attempt in 1..=self.config.max_cas_attempts {
            if record.tier.is_unlimited() {
                return Ok(false);
            }
            let next = match state_machine::adjust(&record, -1) {
                Ok(next) => next,
                Err(_) => return Err(AccessError::Denied(DenialReason::InsufficientCredit)),
            };

            match self
                .store
                .compare_and_swap(user_id, record.version, next)
                .await?
            {
                CasOutcome::Swapped(_) => return Ok(true),
                CasOutcome::Conflict(current) => {
                    debug!(user_id = %user_id, attempt, "Reserve CAS conflict");
                    record = current;
                }
            }

            if started.elapsed() >= self.config.reserve_timeout {
                warn!(user_id = %user_id, attempt, "Reserve deadline exceeded");
                return Err(AccessError::Denied(self.denial_after_contention(&record)));
            }
            if attempt < self.config.max_cas_attempts {
                tokio::time::sleep(self.config.backoff(attempt)).await;
            }
        }

        let reason = self.denial_after_contention(&record);
        if reason == DenialReason::TransientContention {
            warn!(
                user_id = %user_id,
                attempts = self.config.max_cas_attempts,
                "Reserve gave up after repeated CAS conflicts"
            );
        }
        Err(AccessError::Denied(reason))
    }

    // The last observed record may already show the balance is gone.
    fn denial_after_contention(&self, record: &EntitlementRecord) -> DenialReason {
        if record.can_consume() {
            DenialReason::TransientContention
        } else {
            DenialReason::InsufficientCredit
        }
    }

    /// Returns one credit, at most once per reservation.
    ///
    /// Goes through `apply_event` with a key derived from the reservation id,
    /// so the credit and the dedup mark are written together.
    async fn refund(&self, user_id: &UserId, id: &ReservationId) -> Result<(), AccessError> {
        let key = EventId::for_refund(id);
        match self
            .store
            .apply_event(user_id, &key, &EntitlementEventType::ReservationRefunded)
            .await
        {
            Ok(ApplyOutcome::Applied(record)) => {
                debug!(user_id = %user_id, reservation_id = %id, credits = record.credits, "Credit refunded");
                Ok(())
            }
            Ok(ApplyOutcome::AlreadyProcessed) => {
                debug!(user_id = %user_id, reservation_id = %id, "Refund already applied");
                Ok(())
            }
            Err(e) => {
                error!(
                    user_id = %user_id,
                    reservation_id = %id,
                    error = %e,
                    "Refund failed; reservation left releasing"
                );
                Err(e.into())
            }
        }
    }
}

fn settled(
    id: &ReservationId,
    target: ReservationState,
    outcome: SettleOutcome,
) -> Result<Reservation, AccessError> {
    match outcome {
        SettleOutcome::Settled(reservation) => Ok(reservation),
        SettleOutcome::AlreadySettled(state) => {
            warn!(reservation_id = %id, state = %state, target = %target, "Reservation already settled");
            Err(AccessError::ReservationAlreadySettled { id: *id, state })
        }
        SettleOutcome::NotFound => Err(AccessError::ReservationNotFound(*id)),
    }
}
