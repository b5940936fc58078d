//! ContentAnalyzer port - The costly metered operation.
//!
//! The ledger treats analysis as opaque: bytes in, JSON result or error out.
//! Callers must hold a reservation from the access gate before invoking it.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::UserId;

/// Content submitted for analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub user_id: UserId,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

/// Errors from the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzerError {
    #[error("analysis timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("analyzer unavailable: {message}")]
    Unavailable { message: String },

    #[error("analyzer rejected content: {0}")]
    Rejected(String),

    #[error("analyzer authentication failed")]
    AuthenticationFailed,

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl AnalyzerError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        AnalyzerError::Unavailable {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        AnalyzerError::Network(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        AnalyzerError::Parse(message.into())
    }
}

/// Port for the external analysis service.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Runs one analysis and returns its result document.
    async fn analyze(&self, request: AnalysisRequest) -> Result<serde_json::Value, AnalyzerError>;
}
