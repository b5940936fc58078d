//! EventDeduplicator port - Membership in the processed-event set.
//!
//! Provider deliveries are at-least-once: timeouts, 5xx responses and lost
//! acknowledgements all trigger redelivery. Events that change an entitlement
//! are deduplicated inside [`EntitlementStore::apply_event`]; this port covers
//! the remaining cases (events with no target user, retention pruning).
//!
//! [`EntitlementStore::apply_event`]: super::EntitlementStore::apply_event

use async_trait::async_trait;

use crate::domain::entitlement::{EntitlementEventType, StoreError};
use crate::domain::foundation::{EventId, Timestamp};

/// Result of marking an event as applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// First time this event id was seen.
    Marked,
    /// Another delivery already marked it.
    AlreadyMarked,
}

/// Port over the processed-event set.
///
/// `mark_applied` must be a single atomic check-and-set (a primary key insert
/// with `ON CONFLICT DO NOTHING`, or a mutex-guarded set insert).
#[async_trait]
pub trait EventDeduplicator: Send + Sync {
    /// Returns true if `event_id` is already in the processed set.
    async fn has_applied(&self, event_id: &EventId) -> Result<bool, StoreError>;

    /// Adds `event_id` to the processed set if absent.
    async fn mark_applied(
        &self,
        event_id: &EventId,
        event_type: &EntitlementEventType,
    ) -> Result<MarkOutcome, StoreError>;

    /// Removes entries processed before `cutoff`. Returns how many were removed.
    async fn delete_processed_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}
