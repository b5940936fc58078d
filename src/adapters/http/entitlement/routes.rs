//! Axum router configuration for the ledger endpoints.
//!
//! This module defines the route structure and wires routes to their handlers.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use super::handlers::{
    adjust_credits, commit_reservation, get_my_entitlement, handle_payment_webhook, health,
    release_reservation, require_admin, reserve_access, run_analysis, EntitlementAppState,
};

/// Default ceiling for a single webhook body (64 KiB).
pub const DEFAULT_MAX_EVENT_BODY_BYTES: usize = 64 * 1024;

/// Body size limits applied per route group.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    pub webhook_bytes: usize,
    pub upload_bytes: usize,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self {
            webhook_bytes: DEFAULT_MAX_EVENT_BODY_BYTES,
            upload_bytes: crate::application::handlers::entitlement::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Webhook ingress (no user auth; signature verified by the handler).
///
/// # Routes
/// - `POST /lemon-squeezy` - Payment provider deliveries
pub fn webhook_routes(limit_bytes: usize) -> Router<EntitlementAppState> {
    Router::new()
        .route("/lemon-squeezy", post(handle_payment_webhook))
        .layer(DefaultBodyLimit::max(limit_bytes))
}

/// Access gate routes (require `X-User-Id`).
///
/// # Routes
/// - `POST /reserve` - Reserve one metered use
/// - `POST /reservations/:id/commit` - Keep the reserved credit
/// - `POST /reservations/:id/release` - Return the reserved credit
pub fn access_routes() -> Router<EntitlementAppState> {
    Router::new()
        .route("/reserve", post(reserve_access))
        .route("/reservations/:id/commit", post(commit_reservation))
        .route("/reservations/:id/release", post(release_reservation))
}

/// Admin routes, guarded by the bearer admin token.
///
/// # Routes
/// - `POST /entitlements/:user_id/adjust` - Credit correction
pub fn admin_routes(state: EntitlementAppState) -> Router<EntitlementAppState> {
    Router::new()
        .route("/entitlements/:user_id/adjust", post(adjust_credits))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

/// Create the complete ledger router.
///
/// Optional surfaces follow the state: `/api/analyses` is mounted only with an
/// analyzer, `/api/admin` only with an admin token.
///
/// # Example
///
/// ```ignore
/// let app = entitlement_router(state, BodyLimits::default())
///     .layer(TraceLayer::new_for_http());
/// ```
pub fn entitlement_router(state: EntitlementAppState, limits: BodyLimits) -> Router {
    let mut api = Router::new()
        .nest("/webhooks", webhook_routes(limits.webhook_bytes))
        .nest("/access", access_routes())
        .route("/entitlements/me", get(get_my_entitlement));

    if state.analyzer.is_some() {
        api = api.route(
            "/analyses",
            post(run_analysis).layer(DefaultBodyLimit::max(limits.upload_bytes)),
        );
    }

    if state.admin_token.is_some() {
        api = api.nest("/admin", admin_routes(state.clone()));
    }

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use crate::adapters::analyzer::MockContentAnalyzer;
    use crate::adapters::memory::{InMemoryEntitlementStore, InMemoryReservationRepository};
    use crate::application::handlers::entitlement::{
        AccessGate, AccessGateConfig, RunMeteredAnalysisConfig,
    };
    use crate::domain::entitlement::{EntitlementRecord, SignatureVerifier, Tier};
    use crate::domain::foundation::UserId;

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn test_state(
        with_analyzer: bool,
        admin_token: Option<&str>,
    ) -> (EntitlementAppState, Arc<InMemoryEntitlementStore>) {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let reservations = Arc::new(InMemoryReservationRepository::new());
        let gate = Arc::new(AccessGate::new(
            store.clone(),
            reservations.clone(),
            AccessGateConfig::default(),
        ));
        let state = EntitlementAppState {
            store: store.clone(),
            deduplicator: store.clone(),
            reservations,
            gate,
            verifier: SignatureVerifier::new("whsec_test"),
            analyzer: if with_analyzer {
                Some(Arc::new(MockContentAnalyzer::new()))
            } else {
                None
            },
            analysis: RunMeteredAnalysisConfig::default(),
            max_cas_attempts: 8,
            admin_token: admin_token.map(|t| SecretString::new(t.to_string())),
        };
        (state, store)
    }

    async fn seed(store: &InMemoryEntitlementStore, user: &str, credits: u32) {
        store
            .seed(
                UserId::new(user).unwrap(),
                EntitlementRecord {
                    credits,
                    tier: Tier::Free,
                    version: 1,
                },
            )
            .await;
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    fn post_as(uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("X-User-Id", user)
            .body(Body::empty())
            .unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Router Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn health_responds_ok() {
        let (state, _) = test_state(false, None);
        let app = entitlement_router(state, BodyLimits::default());

        let (status, json) = send(
            app,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn entitlement_read_requires_user_header() {
        let (state, _) = test_state(false, None);
        let app = entitlement_router(state, BodyLimits::default());

        let (status, json) = send(
            app,
            Request::builder()
                .uri("/api/entitlements/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error_code"], "authentication_required");
    }

    #[tokio::test]
    async fn reserve_then_commit_round_trip() {
        let (state, store) = test_state(false, None);
        seed(&store, "u1", 1).await;
        let app = entitlement_router(state, BodyLimits::default());

        let (status, json) = send(app.clone(), post_as("/api/access/reserve", "u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["allowed"], true);
        let id = json["reservation_id"].as_str().unwrap().to_string();

        let (status, json) = send(
            app.clone(),
            post_as(&format!("/api/access/reservations/{}/commit", id), "u1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "committed");

        let (status, json) = send(
            app,
            post_as(&format!("/api/access/reservations/{}/release", id), "u1"),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error_code"], "reservation_already_settled");
    }

    #[tokio::test]
    async fn reserve_without_credit_is_denied_not_an_error() {
        let (state, _) = test_state(false, None);
        let app = entitlement_router(state, BodyLimits::default());

        let (status, json) = send(app, post_as("/api/access/reserve", "broke")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"], "insufficient_credit");
    }

    #[tokio::test]
    async fn other_users_reservation_is_not_found() {
        let (state, store) = test_state(false, None);
        seed(&store, "owner", 1).await;
        let app = entitlement_router(state, BodyLimits::default());

        let (_, json) = send(app.clone(), post_as("/api/access/reserve", "owner")).await;
        let id = json["reservation_id"].as_str().unwrap().to_string();

        let (status, _) = send(
            app,
            post_as(&format!("/api/access/reservations/{}/release", id), "intruder"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn analyses_route_absent_without_analyzer() {
        let (state, _) = test_state(false, None);
        let app = entitlement_router(state, BodyLimits::default());

        let (status, _) = send(app, post_as("/api/analyses", "u1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn analysis_consumes_one_credit() {
        let (state, store) = test_state(true, None);
        seed(&store, "u1", 2).await;
        let app = entitlement_router(state, BodyLimits::default());

        let request = Request::builder()
            .method("POST")
            .uri("/api/analyses")
            .header("X-User-Id", "u1")
            .header("Content-Type", "application/pdf")
            .body(Body::from(vec![1u8, 2, 3, 4]))
            .unwrap();
        let (status, json) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["analysis"]["bytes"], 4);

        let (_, json) = send(
            app,
            Request::builder()
                .uri("/api/entitlements/me")
                .header("X-User-Id", "u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(json["credits"], 1);
    }

    #[tokio::test]
    async fn admin_route_absent_without_token() {
        let (state, _) = test_state(false, None);
        let app = entitlement_router(state, BodyLimits::default());

        let request = Request::builder()
            .method("POST")
            .uri("/api/admin/entitlements/u1/adjust")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"delta":5,"reason":"support"}"#))
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_adjust_requires_matching_token() {
        let (state, _) = test_state(false, Some("admin-secret"));
        let app = entitlement_router(state, BodyLimits::default());

        let adjust = |token: &str| {
            Request::builder()
                .method("POST")
                .uri("/api/admin/entitlements/u1/adjust")
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"delta":5,"reason":"support goodwill"}"#))
                .unwrap()
        };

        let (status, _) = send(app.clone(), adjust("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = send(app, adjust("admin-secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["previous"]["credits"], 0);
        assert_eq!(json["current"]["credits"], 5);
    }
}
