//! Content analyzer configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Where the metered analysis is performed.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// URL of the analysis endpoint; absent disables `/api/analyses`
    pub endpoint: Option<String>,

    /// Bearer token for the analysis service
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Serve canned results instead of calling a service (development only)
    #[serde(default)]
    pub use_mock: bool,
}

impl AnalyzerConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured endpoint, ignoring blanks
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    /// Check if a remote analyzer is configured
    pub fn has_endpoint(&self) -> bool {
        self.endpoint().is_some()
    }

    /// Validate analyzer configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.use_mock && production {
            return Err(ValidationError::MissingRequired("ANALYZER__ENDPOINT"));
        }
        let Some(endpoint) = self.endpoint() else {
            return Ok(());
        };
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ValidationError::InvalidAnalyzerEndpoint);
        }
        if production && !endpoint.starts_with("https://") {
            return Err(ValidationError::AnalyzerMustBeHttps);
        }
        if self.api_key.as_ref().map_or(true, |k| k.trim().is_empty()) {
            return Err(ValidationError::MissingRequired("ANALYZER__API_KEY"));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::ZeroDuration("analyzer.timeout_secs"));
        }
        Ok(())
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_timeout(),
            use_mock: false,
        }
    }
}

fn default_timeout() -> u64 {
    120
}
