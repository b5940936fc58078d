//! HTTP DTOs (Data Transfer Objects) for the ledger endpoints.
//!
//! These types define the JSON request/response structure for the API.
//! They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};

use crate::application::handlers::entitlement::{GetEntitlementResult, WebhookOutcome};
use crate::domain::entitlement::{EntitlementRecord, Reservation, ReservationState, Tier};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Administrative credit correction.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustCreditsRequest {
    /// Signed change to apply to the balance.
    pub delta: i64,
    /// Why the correction is being made.
    pub reason: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Acknowledgement returned to the payment provider.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

/// Result of a reserve call. Denials are reported here rather than as errors.
#[derive(Debug, Clone, Serialize)]
pub struct ReserveResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReserveResponse {
    pub fn allowed(reservation: &Reservation) -> Self {
        Self {
            allowed: true,
            reservation_id: Some(reservation.id.to_string()),
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reservation_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// A reservation after commit or release.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationResponse {
    pub reservation_id: String,
    pub state: ReservationState,
    pub debited: bool,
    /// When the reservation was settled (ISO 8601).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<String>,
}

impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        Self {
            reservation_id: reservation.id.to_string(),
            state: reservation.state,
            debited: reservation.debited,
            settled_at: reservation.settled_at.map(|t| t.as_datetime().to_rfc3339()),
        }
    }
}

/// The caller's balance.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementResponse {
    pub credits: u32,
    pub tier: Tier,
    pub can_analyze: bool,
}

impl From<GetEntitlementResult> for EntitlementResponse {
    fn from(result: GetEntitlementResult) -> Self {
        Self {
            credits: result.credits,
            tier: result.tier,
            can_analyze: result.can_analyze,
        }
    }
}

/// Output of a metered analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub reservation_id: String,
    pub analysis: serde_json::Value,
}

/// Balance snapshot used in admin responses.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub credits: u32,
    pub tier: Tier,
    pub version: u64,
}

impl From<EntitlementRecord> for BalanceView {
    fn from(record: EntitlementRecord) -> Self {
        Self {
            credits: record.credits,
            tier: record.tier,
            version: record.version,
        }
    }
}

/// Result of an administrative adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustCreditsResponse {
    pub user_id: String,
    pub previous: BalanceView,
    pub current: BalanceView,
}

/// Liveness probe body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
