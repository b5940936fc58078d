//! Admin surface configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Minimum admin token length.
pub const MIN_ADMIN_TOKEN_LEN: usize = 16;

/// Admin API configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for `/api/admin`; absent leaves the admin routes unmounted
    pub api_token: Option<String>,
}

impl AdminConfig {
    /// Configured token, ignoring blanks
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Validate admin configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.api_token() {
            Some(token) if token.len() < MIN_ADMIN_TOKEN_LEN => {
                Err(ValidationError::AdminTokenTooShort(MIN_ADMIN_TOKEN_LEN))
            }
            _ => Ok(()),
        }
    }
}
