//! Webhook error types for payment provider deliveries.
//!
//! Each error maps to an HTTP status that tells the provider whether to
//! redeliver: 4xx is final, 5xx is retried.

use axum::http::StatusCode;
use thiserror::Error;

use super::StoreError;

/// Errors that occur while ingesting a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature header absent.
    #[error("Missing signature")]
    MissingSignature,

    /// Signature did not match the body.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Body is not valid JSON or has the wrong shape.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from the payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Entitlement store failed; the provider should redeliver.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WebhookError {
    /// Returns true if the provider should redeliver this event.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Store(_))
    }

    /// Maps the error to the status code returned to the provider.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::ParseError(_) | WebhookError::MissingField(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature => "missing_signature",
            WebhookError::InvalidSignature => "invalid_signature",
            WebhookError::ParseError(_) => "invalid_payload",
            WebhookError::MissingField(_) => "missing_field",
            WebhookError::Store(_) => "store_unavailable",
        }
    }
}
