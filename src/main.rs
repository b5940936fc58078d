//! Entitlement ledger HTTP server.
//!
//! Loads configuration, wires the stores (PostgreSQL or in-memory), starts the
//! reservation sweeper and serves the API until SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use entitlement_ledger::adapters::analyzer::{
    HttpAnalyzerConfig, HttpContentAnalyzer, MockContentAnalyzer,
};
use entitlement_ledger::adapters::http::{entitlement_router, BodyLimits, EntitlementAppState};
use entitlement_ledger::adapters::jobs::{ReservationSweeper, ReservationSweeperConfig};
use entitlement_ledger::adapters::memory::{
    InMemoryEntitlementStore, InMemoryReservationRepository,
};
use entitlement_ledger::adapters::postgres::{
    PostgresEntitlementStore, PostgresReservationRepository,
};
use entitlement_ledger::application::handlers::RunMeteredAnalysisConfig;
use entitlement_ledger::application::{AccessGate, AccessGateConfig};
use entitlement_ledger::config::{AppConfig, ServerConfig};
use entitlement_ledger::domain::entitlement::SignatureVerifier;
use entitlement_ledger::ports::{
    ContentAnalyzer, EntitlementStore, EventDeduplicator, ReservationRepository,
};

/// Port implementations selected at startup.
struct Stores {
    store: Arc<dyn EntitlementStore>,
    deduplicator: Arc<dyn EventDeduplicator>,
    reservations: Arc<dyn ReservationRepository>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.server);
    config.validate().context("invalid configuration")?;

    info!(
        environment = ?config.server.environment,
        "Starting entitlement ledger"
    );

    let stores = build_stores(&config).await?;
    let analyzer = build_analyzer(&config)?;

    let gate = Arc::new(AccessGate::new(
        stores.store.clone(),
        stores.reservations.clone(),
        AccessGateConfig::default()
            .with_max_cas_attempts(config.ledger.max_cas_attempts)
            .with_reserve_timeout(config.ledger.reserve_timeout()),
    ));

    // Background reclamation
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ReservationSweeper::new(
        gate.clone(),
        stores.reservations.clone(),
        stores.deduplicator.clone(),
        ReservationSweeperConfig::default()
            .with_interval(config.ledger.sweep_interval())
            .with_reservation_ttl(config.ledger.reservation_ttl())
            .with_retention_days(config.ledger.processed_event_retention_days),
    );
    let sweeper_handle = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let state = EntitlementAppState {
        store: stores.store,
        deduplicator: stores.deduplicator,
        reservations: stores.reservations,
        gate,
        verifier: SignatureVerifier::new(config.payment.webhook_secret.clone()),
        analyzer,
        analysis: RunMeteredAnalysisConfig {
            max_upload_bytes: config.ledger.max_upload_bytes,
            refund_on_failure: config.ledger.refund_on_failure,
        },
        max_cas_attempts: config.ledger.max_cas_attempts,
        admin_token: config
            .admin
            .api_token()
            .map(|t| SecretString::new(t.to_string())),
    };
    if state.admin_token.is_none() {
        info!("No admin token configured; admin routes disabled");
    }

    let limits = BodyLimits {
        webhook_bytes: config.payment.max_event_body_bytes,
        upload_bytes: config.ledger.max_upload_bytes,
    };
    let app = entitlement_router(state, limits)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(cors_layer(&config.server))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("HTTP server stopped; waiting for sweeper");
    if shutdown_tx.send(true).is_err() {
        debug!("Reservation sweeper already stopped");
    }
    if let Err(e) = sweeper_handle.await {
        error!(error = %e, "Sweeper task failed");
    }

    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` overrides `server.log_level`.
fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if server.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }
}

async fn build_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    let Some(url) = config.database.url() else {
        warn!("No database configured; using in-memory stores (state is lost on restart)");
        let store = Arc::new(InMemoryEntitlementStore::new());
        return Ok(Stores {
            store: store.clone(),
            deduplicator: store,
            reservations: Arc::new(InMemoryReservationRepository::new()),
        });
    };

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(config.database.idle_timeout())
        .max_lifetime(config.database.max_lifetime())
        .connect(url)
        .await
        .context("failed to connect to database")?;

    if config.database.run_migrations {
        info!("Running migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
    }

    let store = Arc::new(PostgresEntitlementStore::new(pool.clone()));
    Ok(Stores {
        store: store.clone(),
        deduplicator: store,
        reservations: Arc::new(PostgresReservationRepository::new(pool)),
    })
}

fn build_analyzer(config: &AppConfig) -> anyhow::Result<Option<Arc<dyn ContentAnalyzer>>> {
    let analyzer = &config.analyzer;

    if let Some(endpoint) = analyzer.endpoint() {
        let api_key = analyzer.api_key.clone().unwrap_or_default();
        let http = HttpContentAnalyzer::new(
            HttpAnalyzerConfig::new(endpoint, api_key).with_timeout(analyzer.timeout()),
        )
        .context("failed to build analyzer client")?;
        info!(endpoint, "Analysis service configured");
        let http: Arc<dyn ContentAnalyzer> = Arc::new(http);
        return Ok(Some(http));
    }

    if analyzer.use_mock {
        warn!("Using mock analyzer");
        let mock: Arc<dyn ContentAnalyzer> = Arc::new(MockContentAnalyzer::new());
        return Ok(Some(mock));
    }

    info!("No analysis service configured; /api/analyses disabled");
    Ok(None)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    if origins.is_empty() {
        if server.is_production() {
            return CorsLayer::new();
        }
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Unable to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
