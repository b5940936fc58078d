//! Entitlement handlers.
//!
//! ## Commands
//! - Processing payment webhooks
//! - Reserving, committing and releasing access (`AccessGate`)
//! - Running the metered analysis
//! - Administrative credit adjustments
//!
//! ## Queries
//! - Get a user's entitlement

mod access_gate;
mod adjust_credits;
mod get_entitlement;
mod handle_payment_webhook;
mod run_metered_analysis;

// Commands
pub use access_gate::{AccessGate, AccessGateConfig};
pub use adjust_credits::{
    AdjustCreditsCommand, AdjustCreditsError, AdjustCreditsHandler, AdjustCreditsResult,
};
pub use handle_payment_webhook::{
    HandlePaymentWebhookCommand, HandlePaymentWebhookHandler, HandlePaymentWebhookResult,
    WebhookOutcome,
};
pub use run_metered_analysis::{
    RunMeteredAnalysisCommand, RunMeteredAnalysisConfig, RunMeteredAnalysisError,
    RunMeteredAnalysisHandler, RunMeteredAnalysisResult, DEFAULT_MAX_UPLOAD_BYTES,
};

// Queries
pub use get_entitlement::{GetEntitlementHandler, GetEntitlementQuery, GetEntitlementResult};
