//! RunMeteredAnalysisHandler - Reserve, analyze, then commit or release.
//!
//! Uploads are validated before reserving, so a rejected upload never touches
//! the balance. Once the analyzer has been called the outcome decides the
//! settlement: success commits; failure releases when `refund_on_failure` is
//! set and commits otherwise.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::entitlement::AccessError;
use crate::domain::foundation::{ReservationId, UserId};
use crate::ports::{AnalysisRequest, AnalyzerError, ContentAnalyzer};

use super::AccessGate;

/// Default upload ceiling (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Command to run one metered analysis.
#[derive(Debug, Clone)]
pub struct RunMeteredAnalysisCommand {
    pub user_id: UserId,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

/// Successful analysis.
#[derive(Debug, Clone)]
pub struct RunMeteredAnalysisResult {
    pub reservation_id: ReservationId,
    pub analysis: serde_json::Value,
}

/// Errors from the metered analysis flow.
#[derive(Debug, Error)]
pub enum RunMeteredAnalysisError {
    #[error("Upload is empty")]
    EmptyUpload,

    #[error("Upload of {size} bytes exceeds the {max} byte limit")]
    UploadTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("Analysis failed: {source}")]
    Analyzer {
        #[source]
        source: AnalyzerError,
        /// Whether the reserved credit was returned.
        refunded: bool,
    },
}

/// Handler configuration.
#[derive(Debug, Clone)]
pub struct RunMeteredAnalysisConfig {
    pub max_upload_bytes: usize,
    pub refund_on_failure: bool,
}

impl Default for RunMeteredAnalysisConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            refund_on_failure: true,
        }
    }
}

/// Handler for the gated analysis operation.
pub struct RunMeteredAnalysisHandler {
    gate: Arc<AccessGate>,
    analyzer: Arc<dyn ContentAnalyzer>,
    config: RunMeteredAnalysisConfig,
}

impl RunMeteredAnalysisHandler {
    pub fn new(
        gate: Arc<AccessGate>,
        analyzer: Arc<dyn ContentAnalyzer>,
        config: RunMeteredAnalysisConfig,
    ) -> Self {
        Self {
            gate,
            analyzer,
            config,
        }
    }

    pub async fn handle(
        &self,
        cmd: RunMeteredAnalysisCommand,
    ) -> Result<RunMeteredAnalysisResult, RunMeteredAnalysisError> {
        // 1. Validate before touching the balance
        if cmd.content.is_empty() {
            return Err(RunMeteredAnalysisError::EmptyUpload);
        }
        if cmd.content.len() > self.config.max_upload_bytes {
            return Err(RunMeteredAnalysisError::UploadTooLarge {
                size: cmd.content.len(),
                max: self.config.max_upload_bytes,
            });
        }

        // 2. Reserve
        let reservation = self.gate.reserve(&cmd.user_id).await?;

        // 3. Analyze
        let request = AnalysisRequest {
            user_id: cmd.user_id.clone(),
            content: cmd.content,
            content_type: cmd.content_type,
        };
        match self.analyzer.analyze(request).await {
            Ok(analysis) => {
                // The operation already ran; a failed commit only loses bookkeeping.
                if let Err(e) = self.gate.commit(&reservation.id).await {
                    error!(
                        reservation_id = %reservation.id,
                        error = %e,
                        "Commit after successful analysis failed"
                    );
                }
                info!(user_id = %cmd.user_id, reservation_id = %reservation.id, "Analysis completed");
                Ok(RunMeteredAnalysisResult {
                    reservation_id: reservation.id,
                    analysis,
                })
            }
            Err(source) => {
                warn!(
                    user_id = %cmd.user_id,
                    reservation_id = %reservation.id,
                    error = %source,
                    "Analysis failed"
                );
                let refunded = self.settle_failure(&reservation.id, reservation.debited).await;
                Err(RunMeteredAnalysisError::Analyzer { source, refunded })
            }
        }
    }

    async fn settle_failure(&self, id: &ReservationId, debited: bool) -> bool {
        if self.config.refund_on_failure {
            match self.gate.release(id).await {
                Ok(_) => debited,
                Err(e) => {
                    error!(reservation_id = %id, error = %e, "Release after failed analysis failed");
                    false
                }
            }
        } else {
            if let Err(e) = self.gate.commit(id).await {
                error!(reservation_id = %id, error = %e, "Commit after failed analysis failed");
            }
            false
        }
    }
}
