//! Entitlement-affecting event types and their provider names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider event name for a completed one-time purchase.
pub const ORDER_CREATED: &str = "order_created";
/// Provider event name for a newly started subscription.
pub const SUBSCRIPTION_CREATED: &str = "subscription_created";
/// Provider event name for a cancelled subscription.
pub const SUBSCRIPTION_CANCELLED: &str = "subscription_cancelled";

/// Closed set of events the ledger understands.
///
/// Provider names map onto variants only through [`from_provider_name`];
/// anything without an explicit mapping becomes `Unknown` and is applied as
/// an identity transition. `ReservationRefunded` is raised by the access gate
/// and has no provider name.
///
/// [`from_provider_name`]: EntitlementEventType::from_provider_name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementEventType {
    PurchaseCompleted,
    SubscriptionStarted,
    SubscriptionCancelled,
    ReservationRefunded,
    Unknown(String),
}

impl EntitlementEventType {
    /// Maps a payment provider event name onto the ledger's event types.
    pub fn from_provider_name(name: &str) -> Self {
        match name {
            ORDER_CREATED => EntitlementEventType::PurchaseCompleted,
            SUBSCRIPTION_CREATED => EntitlementEventType::SubscriptionStarted,
            SUBSCRIPTION_CANCELLED => EntitlementEventType::SubscriptionCancelled,
            other => EntitlementEventType::Unknown(other.to_string()),
        }
    }

    /// Returns true for every variant except `Unknown`.
    pub fn is_known(&self) -> bool {
        !matches!(self, EntitlementEventType::Unknown(_))
    }

    /// Stable name used in logs and the processed-event audit column.
    pub fn as_str(&self) -> &str {
        match self {
            EntitlementEventType::PurchaseCompleted => "purchase_completed",
            EntitlementEventType::SubscriptionStarted => "subscription_started",
            EntitlementEventType::SubscriptionCancelled => "subscription_cancelled",
            EntitlementEventType::ReservationRefunded => "reservation_refunded",
            EntitlementEventType::Unknown(name) => name,
        }
    }
}

impl fmt::Display for EntitlementEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitlementEventType::Unknown(name) => write!(f, "unknown({})", name),
            known => f.write_str(known.as_str()),
        }
    }
}
