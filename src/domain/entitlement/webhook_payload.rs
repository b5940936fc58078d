//! Webhook payload parsing.
//!
//! Accepts the flat shape `{event_id, event_name, custom_data: {user_id}}` and
//! the provider's envelope `{meta: {event_id | webhook_id, event_name,
//! custom_data: {user_id}}, data: ...}`. Top-level fields take precedence.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::foundation::{EventId, UserId, REFUND_EVENT_PREFIX};

use super::{EntitlementEventType, WebhookError};

/// A verified delivery reduced to what the ledger needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub event_id: EventId,
    pub event_name: String,
    pub event_type: EntitlementEventType,
    /// Absent when the checkout carried no user reference.
    pub user_id: Option<UserId>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    event_id: Option<String>,
    event_name: Option<String>,
    custom_data: Option<RawCustomData>,
    meta: Option<RawMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    event_id: Option<String>,
    webhook_id: Option<String>,
    event_name: Option<String>,
    custom_data: Option<RawCustomData>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCustomData {
    // Checkout custom data is free-form; numeric ids show up too.
    user_id: Option<Value>,
}

impl WebhookEvent {
    /// Parses a raw body that has already passed signature verification.
    pub fn parse(raw_body: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawPayload = serde_json::from_slice(raw_body)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let meta = raw.meta.unwrap_or_default();

        let event_id = non_blank(raw.event_id)
            .or_else(|| non_blank(meta.event_id))
            .or_else(|| non_blank(meta.webhook_id))
            .ok_or(WebhookError::MissingField("event_id"))?;
        // Refund keys share the processed set with provider ids.
        if event_id.starts_with(REFUND_EVENT_PREFIX) {
            return Err(WebhookError::ParseError(format!(
                "event_id uses reserved prefix {}",
                REFUND_EVENT_PREFIX
            )));
        }
        let event_id =
            EventId::new(event_id).map_err(|_| WebhookError::MissingField("event_id"))?;

        let event_name = non_blank(raw.event_name)
            .or_else(|| non_blank(meta.event_name))
            .ok_or(WebhookError::MissingField("event_name"))?;

        let user_id = raw
            .custom_data
            .and_then(|c| user_id_from(c.user_id))
            .or_else(|| meta.custom_data.and_then(|c| user_id_from(c.user_id)));

        Ok(Self {
            event_id,
            event_type: EntitlementEventType::from_provider_name(&event_name),
            event_name,
            user_id,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn user_id_from(value: Option<Value>) -> Option<UserId> {
    match value? {
        Value::String(s) => UserId::new(s).ok(),
        Value::Number(n) => UserId::new(n.to_string()).ok(),
        _ => None,
    }
}
