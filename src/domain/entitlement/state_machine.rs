//! Pure entitlement transitions.
//!
//! Every change to an [`EntitlementRecord`] balance is computed here, whether
//! it comes from a webhook event, an access reservation, or an administrative
//! correction. Stores persist the result; they never compute balances.
//! None of these functions touch `version`.

use thiserror::Error;

use super::{EntitlementEventType, EntitlementRecord, Tier};

/// Rejected credit adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdjustmentError {
    #[error("Adjustment of {delta} would take credits from {current} below zero")]
    WouldGoNegative { current: u32, delta: i64 },

    #[error("Adjustment of {delta} would overflow credits from {current}")]
    Overflow { current: u32, delta: i64 },
}

/// Applies a webhook event to a record.
pub fn transition(current: &EntitlementRecord, event: &EntitlementEventType) -> EntitlementRecord {
    match event {
        EntitlementEventType::PurchaseCompleted => on_purchase_completed(current),
        EntitlementEventType::SubscriptionStarted => on_subscription_started(current),
        EntitlementEventType::SubscriptionCancelled => on_subscription_cancelled(current),
        EntitlementEventType::ReservationRefunded => on_reservation_refunded(current),
        EntitlementEventType::Unknown(_) => *current,
    }
}

/// Adds `delta` credits (negative to remove), keeping the balance in range.
pub fn adjust(current: &EntitlementRecord, delta: i64) -> Result<EntitlementRecord, AdjustmentError> {
    let next = i64::from(current.credits) + delta;
    if next < 0 {
        return Err(AdjustmentError::WouldGoNegative {
            current: current.credits,
            delta,
        });
    }
    let credits = u32::try_from(next).map_err(|_| AdjustmentError::Overflow {
        current: current.credits,
        delta,
    })?;
    Ok(EntitlementRecord { credits, ..*current })
}

fn on_purchase_completed(current: &EntitlementRecord) -> EntitlementRecord {
    EntitlementRecord {
        credits: current.credits.saturating_add(1),
        ..*current
    }
}

fn on_subscription_started(current: &EntitlementRecord) -> EntitlementRecord {
    EntitlementRecord {
        tier: Tier::Pro,
        ..*current
    }
}

// Saturates at the ceiling like a purchase.
fn on_reservation_refunded(current: &EntitlementRecord) -> EntitlementRecord {
    EntitlementRecord {
        credits: current.credits.saturating_add(1),
        ..*current
    }
}

// Cancellation also forfeits any remaining one-time credits.
fn on_subscription_cancelled(current: &EntitlementRecord) -> EntitlementRecord {
    EntitlementRecord {
        tier: Tier::Free,
        credits: 0,
        ..*current
    }
}
