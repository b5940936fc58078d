//! EntitlementStore port - Atomic persistence of per-user entitlement records.
//!
//! The store exclusively owns entitlement records and the processed-event set.
//! Every write goes through one of two atomic primitives:
//!
//! - `apply_event` - dedup check, transition and dedup insert in one commit
//! - `compare_and_swap` - version-checked replacement used by the access gate
//!   and administrative adjustments
//!
//! Implementations must make all writes for a single user linearizable.

use async_trait::async_trait;

use crate::domain::entitlement::{EntitlementEventType, EntitlementRecord, StoreError};
use crate::domain::foundation::{EventId, UserId};

/// Result of applying a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Event recorded; carries the record after the transition.
    Applied(EntitlementRecord),
    /// Event id already in the processed set; nothing changed.
    AlreadyProcessed,
}

/// Result of a compare-and-swap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Write accepted; carries the stored record with its new version.
    Swapped(EntitlementRecord),
    /// Version mismatch; carries the record as currently stored.
    Conflict(EntitlementRecord),
}

/// Port for the durable entitlement ledger.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Applies `event_type` to the user's record exactly once per `event_id`.
    ///
    /// A user with no record starts from [`EntitlementRecord::empty`]. Identity
    /// transitions still enter `event_id` into the processed set.
    async fn apply_event(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        event_type: &EntitlementEventType,
    ) -> Result<ApplyOutcome, StoreError>;

    /// Reads the user's record, or the empty record if none exists.
    async fn read(&self, user_id: &UserId) -> Result<EntitlementRecord, StoreError>;

    /// Replaces the record if its stored version equals `expected_version`.
    ///
    /// An absent row counts as version 0. On success the stored version is
    /// `expected_version + 1`; the `version` field of `new_record` is ignored.
    async fn compare_and_swap(
        &self,
        user_id: &UserId,
        expected_version: u64,
        new_record: EntitlementRecord,
    ) -> Result<CasOutcome, StoreError>;
}
