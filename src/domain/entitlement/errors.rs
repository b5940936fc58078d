//! Error types for the entitlement ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::foundation::ReservationId;

use super::ReservationState;

/// Failures of the durable store behind the ledger ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unreachable or the operation failed mid-flight.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Persisted data could not be mapped back into the domain.
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        StoreError::Corrupt(message.into())
    }
}

/// Why a reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Free tier with no credits left.
    InsufficientCredit,

    /// Compare-and-swap retries or the reserve deadline ran out.
    TransientContention,
}

impl DenialReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::InsufficientCredit => "insufficient_credit",
            DenialReason::TransientContention => "transient_contention",
        }
    }

    /// Returns true if the caller may simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DenialReason::TransientContention)
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors surfaced by the access gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Access denied: {0}")]
    Denied(DenialReason),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    #[error("Reservation {id} already {state}")]
    ReservationAlreadySettled {
        id: ReservationId,
        state: ReservationState,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Denied(reason) => reason.code(),
            AccessError::ReservationNotFound(_) => "reservation_not_found",
            AccessError::ReservationAlreadySettled { .. } => "reservation_already_settled",
            AccessError::Store(_) => "store_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_codes_are_stable() {
        assert_eq!(DenialReason::InsufficientCredit.code(), "insufficient_credit");
        assert_eq!(DenialReason::TransientContention.code(), "transient_contention");
    }

    #[test]
    fn only_contention_is_retryable() {
        assert!(DenialReason::TransientContention.is_retryable());
        assert!(!DenialReason::InsufficientCredit.is_retryable());
    }

    #[test]
    fn denial_reason_serializes_snake_case() {
        let json = serde_json::to_string(&DenialReason::InsufficientCredit).unwrap();
        assert_eq!(json, "\"insufficient_credit\"");
    }

    #[test]
    fn already_settled_names_the_state() {
        let id = ReservationId::new();
        let err = AccessError::ReservationAlreadySettled {
            id,
            state: ReservationState::Released,
        };
        assert_eq!(err.to_string(), format!("Reservation {} already released", id));
        assert_eq!(err.code(), "reservation_already_settled");
    }

    #[test]
    fn store_errors_convert_into_access_errors() {
        let err: AccessError = StoreError::unavailable("pool timed out").into();
        assert_eq!(err.code(), "store_unavailable");
        assert_eq!(err.to_string(), "Store unavailable: pool timed out");
    }
}
