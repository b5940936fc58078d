//! HTTP content analyzer - Forwards uploads to an external analysis service.
//!
//! # Configuration
//!
//! ```ignore
//! let config = HttpAnalyzerConfig::new("https://analysis.internal/v1/analyze", api_key)
//!     .with_timeout(Duration::from_secs(120));
//! let analyzer = HttpContentAnalyzer::new(config)?;
//! ```
//!
//! The raw upload is posted as the request body with a bearer token; the
//! service answers with a JSON document that is passed through untouched.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

use crate::ports::{AnalysisRequest, AnalyzerError, ContentAnalyzer};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Configuration for the HTTP analyzer.
#[derive(Debug, Clone)]
pub struct HttpAnalyzerConfig {
    /// Full URL of the analyze endpoint.
    pub endpoint: String,
    api_key: Secret<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl HttpAnalyzerConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: Secret::new(api_key.into()),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// `ContentAnalyzer` backed by an HTTP service.
pub struct HttpContentAnalyzer {
    config: HttpAnalyzerConfig,
    client: Client,
}

impl HttpContentAnalyzer {
    pub fn new(config: HttpAnalyzerConfig) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalyzerError::unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AnalyzerError {
        if e.is_timeout() {
            AnalyzerError::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else if e.is_connect() {
            AnalyzerError::network(format!("Connection failed: {}", e))
        } else {
            AnalyzerError::network(e.to_string())
        }
    }
}

/// Maps a non-success status to an analyzer error.
fn error_for_status(status: StatusCode, body: String) -> AnalyzerError {
    match status.as_u16() {
        401 | 403 => AnalyzerError::AuthenticationFailed,
        400 | 413 | 415 | 422 => AnalyzerError::Rejected(body),
        500..=599 => AnalyzerError::unavailable(format!("Server error {}: {}", status, body)),
        _ => AnalyzerError::network(format!("Unexpected status {}: {}", status, body)),
    }
}

#[async_trait]
impl ContentAnalyzer for HttpContentAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<serde_json::Value, AnalyzerError> {
        let content_type = request
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key())
            .header(header::CONTENT_TYPE, content_type)
            .body(request.content)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, body));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AnalyzerError::parse(format!("Failed to parse response: {}", e)))
    }
}
