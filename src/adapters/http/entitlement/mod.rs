//! HTTP adapter for the entitlement ledger.
//!
//! Exposes the ledger via REST API:
//! - `POST /api/webhooks/lemon-squeezy` - Payment provider deliveries
//! - `POST /api/access/reserve` - Reserve one metered use
//! - `POST /api/access/reservations/:id/commit` - Keep the reserved credit
//! - `POST /api/access/reservations/:id/release` - Return the reserved credit
//! - `GET /api/entitlements/me` - Current user's balance
//! - `POST /api/analyses` - Metered analysis (when an analyzer is configured)
//! - `POST /api/admin/entitlements/:user_id/adjust` - Credit correction (when an admin token is configured)
//! - `GET /health` - Liveness probe

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{AuthenticatedUser, EntitlementApiError, EntitlementAppState};
pub use routes::{entitlement_router, BodyLimits, DEFAULT_MAX_EVENT_BODY_BYTES};
