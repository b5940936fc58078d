//! HTTP handlers for the ledger endpoints.
//!
//! These handlers connect axum routes to application layer command/query handlers.

use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Path, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::warn;

use super::dto::{
    AdjustCreditsRequest, AdjustCreditsResponse, AnalysisResponse, EntitlementResponse,
    ErrorResponse, HealthResponse, ReservationResponse, ReserveResponse, WebhookAckResponse,
};
use crate::application::handlers::entitlement::{
    AccessGate, AdjustCreditsCommand, AdjustCreditsError, AdjustCreditsHandler,
    GetEntitlementHandler, GetEntitlementQuery, HandlePaymentWebhookCommand,
    HandlePaymentWebhookHandler, RunMeteredAnalysisCommand, RunMeteredAnalysisConfig,
    RunMeteredAnalysisError, RunMeteredAnalysisHandler,
};
use crate::domain::entitlement::{AccessError, SignatureVerifier, StoreError, WebhookError};
use crate::domain::foundation::{ReservationId, UserId};
use crate::ports::{
    AnalyzerError, ContentAnalyzer, EntitlementStore, EventDeduplicator, ReservationRepository,
};

/// Header carrying the provider's hex HMAC of the raw body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Header identifying the caller on user-facing routes.
pub const USER_ID_HEADER: &str = "X-User-Id";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the ledger endpoints.
#[derive(Clone)]
pub struct EntitlementAppState {
    pub store: Arc<dyn EntitlementStore>,
    pub deduplicator: Arc<dyn EventDeduplicator>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub gate: Arc<AccessGate>,
    pub verifier: SignatureVerifier,
    /// Absent when no analysis service is configured; `/api/analyses` is then not mounted.
    pub analyzer: Option<Arc<dyn ContentAnalyzer>>,
    pub analysis: RunMeteredAnalysisConfig,
    pub max_cas_attempts: u32,
    /// Absent disables the admin routes.
    pub admin_token: Option<SecretString>,
}

impl EntitlementAppState {
    pub fn webhook_handler(&self) -> HandlePaymentWebhookHandler {
        HandlePaymentWebhookHandler::new(
            self.verifier.clone(),
            self.store.clone(),
            self.deduplicator.clone(),
        )
    }

    pub fn get_entitlement_handler(&self) -> GetEntitlementHandler {
        GetEntitlementHandler::new(self.store.clone())
    }

    pub fn adjust_credits_handler(&self) -> AdjustCreditsHandler {
        AdjustCreditsHandler::new(self.store.clone(), self.max_cas_attempts)
    }

    /// `None` when no analyzer is configured.
    pub fn analysis_handler(&self) -> Option<RunMeteredAnalysisHandler> {
        self.analyzer.as_ref().map(|analyzer| {
            RunMeteredAnalysisHandler::new(
                self.gate.clone(),
                analyzer.clone(),
                self.analysis.clone(),
            )
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Authentication
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity taken from the `X-User-Id` header.
///
/// Identity is established upstream (gateway or session layer); this service
/// trusts the header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection for a missing or blank `X-User-Id`.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new("authentication_required", "X-User-Id header is required");
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s.trim()).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

/// Middleware guarding the admin routes with a static bearer token.
///
/// Routes behind it are only mounted when a token is configured; a state
/// without one rejects everything.
pub async fn require_admin(
    State(state): State<EntitlementAppState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let authorized = match (state.admin_token.as_ref(), provided) {
        (Some(expected), Some(token)) => bool::from(
            expected
                .expose_secret()
                .as_bytes()
                .ct_eq(token.trim().as_bytes()),
        ),
        _ => false,
    };

    if !authorized {
        warn!(path = %request.uri().path(), "Admin request rejected");
        let body = ErrorResponse::new("admin_token_required", "Valid admin bearer token required");
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    next.run(request).await
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Ingress
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/lemon-squeezy - Apply a payment provider delivery
pub async fn handle_payment_webhook(
    State(state): State<EntitlementAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let handler = state.webhook_handler();
    let cmd = HandlePaymentWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(WebhookAckResponse {
        received: true,
        outcome: result.outcome(),
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Access Gate
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/access/reserve - Reserve one use of the metered operation
///
/// Denials are a normal answer (`allowed: false`); only store failures are errors.
pub async fn reserve_access(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, EntitlementApiError> {
    match state.gate.reserve(&user.user_id).await {
        Ok(reservation) => Ok(Json(ReserveResponse::allowed(&reservation))),
        Err(AccessError::Denied(reason)) => Ok(Json(ReserveResponse::denied(reason.code()))),
        Err(e) => Err(e.into()),
    }
}

/// POST /api/access/reservations/:id/commit - Keep the reserved credit
pub async fn commit_reservation(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let id = owned_reservation(&state, &user, &id).await?;
    let reservation = state.gate.commit(&id).await?;
    tracing::debug!(user_id = %user.user_id, reservation_id = %id, "Reservation committed via API");
    Ok(Json(ReservationResponse::from(reservation)))
}

/// POST /api/access/reservations/:id/release - Return the reserved credit
pub async fn release_reservation(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let id = owned_reservation(&state, &user, &id).await?;
    let reservation = state.gate.release(&id).await?;
    tracing::debug!(user_id = %user.user_id, reservation_id = %id, "Reservation released via API");
    Ok(Json(ReservationResponse::from(reservation)))
}

/// Resolves a path id to a reservation belonging to the caller.
///
/// Another user's reservation is reported as not found.
async fn owned_reservation(
    state: &EntitlementAppState,
    user: &AuthenticatedUser,
    raw: &str,
) -> Result<ReservationId, EntitlementApiError> {
    let id = parse_reservation_id(raw)?;
    match state.reservations.find(&id).await? {
        Some(reservation) if reservation.user_id == user.user_id => Ok(id),
        _ => Err(AccessError::ReservationNotFound(id).into()),
    }
}

fn parse_reservation_id(raw: &str) -> Result<ReservationId, EntitlementApiError> {
    raw.parse::<ReservationId>()
        .map_err(|_| EntitlementApiError::InvalidRequest(format!("Invalid reservation id: {}", raw)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Queries
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/entitlements/me - Current user's balance and tier
pub async fn get_my_entitlement(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let handler = state.get_entitlement_handler();
    let result = handler
        .handle(GetEntitlementQuery {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(EntitlementResponse::from(result)))
}

/// GET /health - Liveness probe
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

// ════════════════════════════════════════════════════════════════════════════════
// Metered Analysis
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/analyses - Reserve, analyze the raw body, then settle
pub async fn run_analysis(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let handler = state
        .analysis_handler()
        .ok_or(EntitlementApiError::AnalysisUnavailable)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let result = handler
        .handle(RunMeteredAnalysisCommand {
            user_id: user.user_id,
            content: body.to_vec(),
            content_type,
        })
        .await?;

    Ok(Json(AnalysisResponse {
        reservation_id: result.reservation_id.to_string(),
        analysis: result.analysis,
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Admin
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/admin/entitlements/:user_id/adjust - Correct a user's credits
pub async fn adjust_credits(
    State(state): State<EntitlementAppState>,
    Path(user_id): Path<String>,
    Json(request): Json<AdjustCreditsRequest>,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let user_id = UserId::new(user_id)
        .map_err(|e| EntitlementApiError::InvalidRequest(e.to_string()))?;

    let handler = state.adjust_credits_handler();
    let result = handler
        .handle(AdjustCreditsCommand {
            user_id: user_id.clone(),
            delta: request.delta,
            reason: request.reason,
        })
        .await?;

    Ok(Json(AdjustCreditsResponse {
        user_id: user_id.to_string(),
        previous: result.previous.into(),
        current: result.current.into(),
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts domain and application errors to HTTP responses.
#[derive(Debug)]
pub enum EntitlementApiError {
    Webhook(WebhookError),
    Access(AccessError),
    Store(StoreError),
    Analysis(RunMeteredAnalysisError),
    Adjust(AdjustCreditsError),
    InvalidRequest(String),
    AnalysisUnavailable,
}

impl From<WebhookError> for EntitlementApiError {
    fn from(err: WebhookError) -> Self {
        Self::Webhook(err)
    }
}

impl From<AccessError> for EntitlementApiError {
    fn from(err: AccessError) -> Self {
        Self::Access(err)
    }
}

impl From<StoreError> for EntitlementApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<RunMeteredAnalysisError> for EntitlementApiError {
    fn from(err: RunMeteredAnalysisError) -> Self {
        Self::Analysis(err)
    }
}

impl From<AdjustCreditsError> for EntitlementApiError {
    fn from(err: AdjustCreditsError) -> Self {
        Self::Adjust(err)
    }
}

fn access_status(err: &AccessError) -> StatusCode {
    match err {
        AccessError::Denied(reason) if reason.is_retryable() => StatusCode::TOO_MANY_REQUESTS,
        AccessError::Denied(_) => StatusCode::PAYMENT_REQUIRED,
        AccessError::ReservationNotFound(_) => StatusCode::NOT_FOUND,
        AccessError::ReservationAlreadySettled { .. } => StatusCode::CONFLICT,
        AccessError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn analyzer_status(err: &AnalyzerError) -> StatusCode {
    match err {
        AnalyzerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AnalyzerError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for EntitlementApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            EntitlementApiError::Webhook(e) => {
                (e.status_code(), ErrorResponse::new(e.code(), e.to_string()))
            }
            EntitlementApiError::Access(e) => {
                (access_status(e), ErrorResponse::new(e.code(), e.to_string()))
            }
            EntitlementApiError::Store(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("store_unavailable", e.to_string()),
            ),
            EntitlementApiError::Analysis(e) => match e {
                RunMeteredAnalysisError::EmptyUpload => (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("empty_upload", e.to_string()),
                ),
                RunMeteredAnalysisError::UploadTooLarge { size, max } => (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorResponse::with_details(
                        "upload_too_large",
                        e.to_string(),
                        serde_json::json!({ "size": size, "max": max }),
                    ),
                ),
                RunMeteredAnalysisError::Access(access) => (
                    access_status(access),
                    ErrorResponse::new(access.code(), access.to_string()),
                ),
                RunMeteredAnalysisError::Analyzer { source, refunded } => (
                    analyzer_status(source),
                    ErrorResponse::with_details(
                        "analysis_failed",
                        e.to_string(),
                        serde_json::json!({ "refunded": refunded }),
                    ),
                ),
            },
            EntitlementApiError::Adjust(e) => match e {
                AdjustCreditsError::Invalid(_) => (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("validation_failed", e.to_string()),
                ),
                AdjustCreditsError::Rejected(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorResponse::new("adjustment_rejected", e.to_string()),
                ),
                AdjustCreditsError::Contention { .. } => (
                    StatusCode::CONFLICT,
                    ErrorResponse::new("transient_contention", e.to_string()),
                ),
                AdjustCreditsError::Store(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::new("store_unavailable", e.to_string()),
                ),
            },
            EntitlementApiError::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("invalid_request", message.clone()),
            ),
            EntitlementApiError::AnalysisUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("analysis_unavailable", "No analysis service is configured"),
            ),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error_code = %body.error_code, message = %body.message, "Request failed");
        }

        (status, Json(body)).into_response()
    }
}
