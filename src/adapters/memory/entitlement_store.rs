//! In-memory entitlement store.
//!
//! Implements both `EntitlementStore` and `EventDeduplicator` over one
//! mutex-guarded state, so the processed-event insert and the record write of
//! `apply_event` happen under the same lock. Suitable for development, tests
//! and single-process deployments; nothing survives a restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::domain::entitlement::{
    state_machine, EntitlementEventType, EntitlementRecord, StoreError,
};
use crate::domain::foundation::{EventId, Timestamp, UserId};
use crate::ports::{
    ApplyOutcome, CasOutcome, EntitlementStore, EventDeduplicator, MarkOutcome,
};

#[derive(Debug, Clone)]
struct ProcessedEntry {
    event_type: String,
    processed_at: Timestamp,
}

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<UserId, EntitlementRecord>,
    processed: HashMap<EventId, ProcessedEntry>,
}

impl LedgerState {
    fn current(&self, user_id: &UserId) -> EntitlementRecord {
        self.records.get(user_id).copied().unwrap_or_default()
    }
}

/// Mutex-guarded implementation of the ledger ports.
#[derive(Debug, Default)]
pub struct InMemoryEntitlementStore {
    state: Mutex<LedgerState>,
    unavailable: AtomicBool,
}

impl InMemoryEntitlementStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly, bypassing the ledger. Test and fixture use only.
    pub async fn seed(&self, user_id: UserId, record: EntitlementRecord) {
        self.state.lock().await.records.insert(user_id, record);
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of entries in the processed-event set.
    pub async fn processed_count(&self) -> usize {
        self.state.lock().await.processed.len()
    }

    /// Event type recorded for a processed event, if any.
    pub async fn processed_event_type(&self, event_id: &EventId) -> Option<String> {
        self.state
            .lock()
            .await
            .processed
            .get(event_id)
            .map(|entry| entry.event_type.clone())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn apply_event(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        event_type: &EntitlementEventType,
    ) -> Result<ApplyOutcome, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        if state.processed.contains_key(event_id) {
            return Ok(ApplyOutcome::AlreadyProcessed);
        }

        let current = state.current(user_id);
        let next = state_machine::transition(&current, event_type);
        let stored = if next.same_balance(&current) {
            current
        } else {
            let stored = next.with_version(current.version + 1);
            state.records.insert(user_id.clone(), stored);
            stored
        };

        state.processed.insert(
            event_id.clone(),
            ProcessedEntry {
                event_type: event_type.as_str().to_string(),
                processed_at: Timestamp::now(),
            },
        );

        Ok(ApplyOutcome::Applied(stored))
    }

    async fn read(&self, user_id: &UserId) -> Result<EntitlementRecord, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.current(user_id))
    }

    async fn compare_and_swap(
        &self,
        user_id: &UserId,
        expected_version: u64,
        new_record: EntitlementRecord,
    ) -> Result<CasOutcome, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        let current = state.current(user_id);
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict(current));
        }

        let stored = new_record.with_version(expected_version + 1);
        state.records.insert(user_id.clone(), stored);
        Ok(CasOutcome::Swapped(stored))
    }
}

#[async_trait]
impl EventDeduplicator for InMemoryEntitlementStore {
    async fn has_applied(&self, event_id: &EventId) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.processed.contains_key(event_id))
    }

    async fn mark_applied(
        &self,
        event_id: &EventId,
        event_type: &EntitlementEventType,
    ) -> Result<MarkOutcome, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.processed.contains_key(event_id) {
            return Ok(MarkOutcome::AlreadyMarked);
        }
        state.processed.insert(
            event_id.clone(),
            ProcessedEntry {
                event_type: event_type.as_str().to_string(),
                processed_at: Timestamp::now(),
            },
        );
        Ok(MarkOutcome::Marked)
    }

    async fn delete_processed_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let before = state.processed.len();
        state
            .processed
            .retain(|_, entry| !entry.processed_at.is_before(&cutoff));
        Ok((before - state.processed.len()) as u64)
    }
}
