//! Payment provider configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Payment webhook configuration (Lemon Squeezy)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Webhook signing secret shared with the provider
    #[serde(default)]
    pub webhook_secret: String,

    /// Largest accepted webhook body in bytes
    #[serde(default = "default_max_event_body_bytes")]
    pub max_event_body_bytes: usize,
}

impl PaymentConfig {
    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.webhook_secret.trim().is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__WEBHOOK_SECRET"));
        }
        if !(1024..=1024 * 1024).contains(&self.max_event_body_bytes) {
            return Err(ValidationError::InvalidEventBodyLimit);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            max_event_body_bytes: default_max_event_body_bytes(),
        }
    }
}

fn default_max_event_body_bytes() -> usize {
    64 * 1024
}
