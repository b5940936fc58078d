//! HandlePaymentWebhookHandler - Applies payment provider deliveries to the ledger.
//!
//! Pipeline: verify signature → parse → dedupe → transition → persist.
//! Entitlement-changing events go through `EntitlementStore::apply_event`,
//! which performs the dedup check and the write in one atomic step.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::entitlement::{
    EntitlementRecord, SignatureVerifier, WebhookError, WebhookEvent,
};
use crate::domain::foundation::{EventId, UserId};
use crate::ports::{ApplyOutcome, EntitlementStore, EventDeduplicator, MarkOutcome};

/// Command to handle one webhook delivery.
#[derive(Debug, Clone)]
pub struct HandlePaymentWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// Value of the signature header, if present.
    pub signature: Option<String>,
}

/// How a delivery was handled. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlePaymentWebhookResult {
    /// Event changed (or confirmed) the user's record.
    Applied {
        event_id: EventId,
        user_id: UserId,
        record: EntitlementRecord,
    },
    /// Event id was already processed.
    AlreadyProcessed { event_id: EventId },
    /// Event name has no mapping; marked applied so it is not redelivered.
    UnknownEventType { event_id: EventId, event_name: String },
    /// Known event without a target user; marked applied and dropped.
    Ignored { event_id: EventId, reason: String },
}

/// Outcome label reported back to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    AlreadyProcessed,
    UnknownEventType,
    Ignored,
}

impl HandlePaymentWebhookResult {
    pub fn outcome(&self) -> WebhookOutcome {
        match self {
            HandlePaymentWebhookResult::Applied { .. } => WebhookOutcome::Applied,
            HandlePaymentWebhookResult::AlreadyProcessed { .. } => WebhookOutcome::AlreadyProcessed,
            HandlePaymentWebhookResult::UnknownEventType { .. } => WebhookOutcome::UnknownEventType,
            HandlePaymentWebhookResult::Ignored { .. } => WebhookOutcome::Ignored,
        }
    }
}

/// Handler for payment provider webhooks.
pub struct HandlePaymentWebhookHandler {
    verifier: SignatureVerifier,
    store: Arc<dyn EntitlementStore>,
    deduplicator: Arc<dyn EventDeduplicator>,
}

impl HandlePaymentWebhookHandler {
    pub fn new(
        verifier: SignatureVerifier,
        store: Arc<dyn EntitlementStore>,
        deduplicator: Arc<dyn EventDeduplicator>,
    ) -> Self {
        Self {
            verifier,
            store,
            deduplicator,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandlePaymentWebhookCommand,
    ) -> Result<HandlePaymentWebhookResult, WebhookError> {
        // 1. Authenticate the raw bytes
        let signature = cmd
            .signature
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                warn!("Webhook rejected: missing signature header");
                WebhookError::MissingSignature
            })?;
        if !self.verifier.verify(&cmd.payload, signature) {
            warn!(body_len = cmd.payload.len(), "Webhook rejected: invalid signature");
            return Err(WebhookError::InvalidSignature);
        }

        // 2. Parse
        let event = WebhookEvent::parse(&cmd.payload)?;

        // 3. Cheap pre-check; the authoritative check is atomic below
        if self.deduplicator.has_applied(&event.event_id).await? {
            debug!(event_id = %event.event_id, "Duplicate webhook delivery");
            return Ok(HandlePaymentWebhookResult::AlreadyProcessed {
                event_id: event.event_id,
            });
        }

        // 4. Dispatch
        match (event.event_type.is_known(), event.user_id.clone()) {
            (true, Some(user_id)) => self.apply(event, user_id).await,
            (true, None) => {
                warn!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    "Webhook carries no user_id, dropping"
                );
                self.mark_only(event, |event| HandlePaymentWebhookResult::Ignored {
                    event_id: event.event_id.clone(),
                    reason: "missing user_id".to_string(),
                })
                .await
            }
            (false, _) => {
                info!(
                    event_id = %event.event_id,
                    event_name = %event.event_name,
                    "Unmapped webhook event acknowledged"
                );
                self.mark_only(event, |event| HandlePaymentWebhookResult::UnknownEventType {
                    event_id: event.event_id.clone(),
                    event_name: event.event_name.clone(),
                })
                .await
            }
        }
    }

    async fn apply(
        &self,
        event: WebhookEvent,
        user_id: UserId,
    ) -> Result<HandlePaymentWebhookResult, WebhookError> {
        match self
            .store
            .apply_event(&user_id, &event.event_id, &event.event_type)
            .await?
        {
            ApplyOutcome::Applied(record) => {
                info!(
                    event_id = %event.event_id,
                    user_id = %user_id,
                    event_type = %event.event_type,
                    credits = record.credits,
                    tier = %record.tier,
                    "Webhook event applied"
                );
                Ok(HandlePaymentWebhookResult::Applied {
                    event_id: event.event_id,
                    user_id,
                    record,
                })
            }
            ApplyOutcome::AlreadyProcessed => {
                debug!(event_id = %event.event_id, "Duplicate webhook delivery");
                Ok(HandlePaymentWebhookResult::AlreadyProcessed {
                    event_id: event.event_id,
                })
            }
        }
    }

    async fn mark_only(
        &self,
        event: WebhookEvent,
        on_marked: impl FnOnce(&WebhookEvent) -> HandlePaymentWebhookResult,
    ) -> Result<HandlePaymentWebhookResult, WebhookError> {
        match self
            .deduplicator
            .mark_applied(&event.event_id, &event.event_type)
            .await?
        {
            MarkOutcome::Marked => Ok(on_marked(&event)),
            MarkOutcome::AlreadyMarked => Ok(HandlePaymentWebhookResult::AlreadyProcessed {
                event_id: event.event_id,
            }),
        }
    }
}
