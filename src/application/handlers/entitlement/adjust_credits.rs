//! AdjustCreditsHandler - Administrative credit correction.
//!
//! Corrections go through the same compare-and-swap primitive as the access
//! gate, never a raw overwrite, so they serialize with reservations and
//! webhook events for the same user.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::entitlement::{state_machine, AdjustmentError, EntitlementRecord, StoreError};
use crate::domain::foundation::{UserId, ValidationError};
use crate::ports::{CasOutcome, EntitlementStore};

/// Command to add (or remove, with a negative delta) credits.
#[derive(Debug, Clone)]
pub struct AdjustCreditsCommand {
    pub user_id: UserId,
    pub delta: i64,
    /// Free-text justification, recorded in the log.
    pub reason: String,
}

/// Result of a successful adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustCreditsResult {
    pub previous: EntitlementRecord,
    pub current: EntitlementRecord,
}

/// Errors from administrative adjustments.
#[derive(Debug, Error)]
pub enum AdjustCreditsError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Rejected(#[from] AdjustmentError),

    #[error("Adjustment abandoned after {attempts} conflicting writes")]
    Contention { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handler for administrative credit corrections.
pub struct AdjustCreditsHandler {
    store: Arc<dyn EntitlementStore>,
    max_attempts: u32,
}

impl AdjustCreditsHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn handle(
        &self,
        cmd: AdjustCreditsCommand,
    ) -> Result<AdjustCreditsResult, AdjustCreditsError> {
        if cmd.delta == 0 {
            return Err(ValidationError::invalid_format("delta", "must be non-zero").into());
        }
        if cmd.reason.trim().is_empty() {
            return Err(ValidationError::empty_field("reason").into());
        }

        for attempt in 1..=self.max_attempts {
            let previous = self.store.read(&cmd.user_id).await?;
            let next = state_machine::adjust(&previous, cmd.delta)?;

            match self
                .store
                .compare_and_swap(&cmd.user_id, previous.version, next)
                .await?
            {
                CasOutcome::Swapped(current) => {
                    info!(
                        user_id = %cmd.user_id,
                        delta = cmd.delta,
                        reason = %cmd.reason,
                        credits = current.credits,
                        "Credits adjusted"
                    );
                    return Ok(AdjustCreditsResult { previous, current });
                }
                CasOutcome::Conflict(_) => {
                    debug!(user_id = %cmd.user_id, attempt, "Adjustment CAS conflict");
                    tokio::task::yield_now().await;
                }
            }
        }

        warn!(user_id = %cmd.user_id, attempts = self.max_attempts, "Adjustment gave up");
        Err(AdjustCreditsError::Contention {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::domain::entitlement::Tier;

    fn user() -> UserId {
        UserId::new("u1").unwrap()
    }

    fn cmd(delta: i64) -> AdjustCreditsCommand {
        AdjustCreditsCommand {
            user_id: user(),
            delta,
            reason: "support ticket 4411".to_string(),
        }
    }

    async fn handler_with(credits: u32) -> (AdjustCreditsHandler, Arc<InMemoryEntitlementStore>) {
        let store = Arc::new(InMemoryEntitlementStore::new());
        store
            .seed(
                user(),
                EntitlementRecord {
                    credits,
                    tier: Tier::Free,
                    version: 3,
                },
            )
            .await;
        (AdjustCreditsHandler::new(store.clone(), 8), store)
    }

    #[tokio::test]
    async fn grants_credits_and_bumps_version() {
        let (handler, store) = handler_with(1).await;
        let result = handler.handle(cmd(5)).await.unwrap();

        assert_eq!(result.previous.credits, 1);
        assert_eq!(result.current.credits, 6);
        assert_eq!(result.current.version, 4);
        assert_eq!(store.read(&user()).await.unwrap().credits, 6);
    }

    #[tokio::test]
    async fn refuses_to_go_negative() {
        let (handler, store) = handler_with(2).await;
        let err = handler.handle(cmd(-3)).await.unwrap_err();

        assert!(matches!(
            err,
            AdjustCreditsError::Rejected(AdjustmentError::WouldGoNegative { current: 2, delta: -3 })
        ));
        assert_eq!(store.read(&user()).await.unwrap().credits, 2);
    }

    #[tokio::test]
    async fn zero_delta_is_invalid() {
        let (handler, _) = handler_with(2).await;
        assert!(matches!(
            handler.handle(cmd(0)).await,
            Err(AdjustCreditsError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn blank_reason_is_invalid() {
        let (handler, _) = handler_with(2).await;
        let mut command = cmd(1);
        command.reason = "  ".to_string();
        assert!(matches!(
            handler.handle(command).await,
            Err(AdjustCreditsError::Invalid(ValidationError::EmptyField { .. }))
        ));
    }
}
