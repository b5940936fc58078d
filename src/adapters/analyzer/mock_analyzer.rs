//! Mock content analyzer for tests and local development.
//!
//! Returns a small canned document, or a configured error, and counts calls.
//!
//! # Example
//!
//! ```ignore
//! let analyzer = MockContentAnalyzer::new();
//! analyzer.fail_with(AnalyzerError::unavailable("down"));
//! assert!(analyzer.analyze(request).await.is_err());
//! ```

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::ports::{AnalysisRequest, AnalyzerError, ContentAnalyzer};

/// Configurable in-process analyzer.
#[derive(Debug, Default)]
pub struct MockContentAnalyzer {
    failure: Mutex<Option<AnalyzerError>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockContentAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every subsequent call fail with `error`.
    pub fn fail_with(&self, error: AnalyzerError) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    /// Restores successful responses.
    pub fn succeed(&self) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Number of analyze calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentAnalyzer for MockContentAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<serde_json::Value, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(json!({
            "status": "ok",
            "bytes": request.content.len(),
            "content_type": request.content_type,
        }))
    }
}
