//! ReservationSweeper - Background reclamation of abandoned reservations.
//!
//! A request that reserves a credit and then crashes, times out, or is
//! dropped never commits or releases. The sweeper releases pending
//! reservations older than the TTL through the access gate, which returns the
//! credit, and prunes the processed-event set past its retention window.
//! Releases whose refund failed are left `releasing` and resumed here too.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 60s | Time between sweeps |
//! | `reservation_ttl` | 15m | Age after which an unsettled reservation is reclaimed |
//! | `processed_event_retention_days` | 90 | Dedup history kept |
//! | `batch_size` | 500 | Max reservations reclaimed per sweep |
//!
//! ## Graceful Shutdown
//!
//! The sweeper listens on a watch channel and finishes the current sweep
//! before stopping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::application::handlers::entitlement::AccessGate;
use crate::domain::entitlement::{AccessError, StoreError};
use crate::domain::foundation::Timestamp;
use crate::ports::{EventDeduplicator, ReservationRepository};

/// Configuration for the ReservationSweeper.
#[derive(Debug, Clone)]
pub struct ReservationSweeperConfig {
    pub interval: Duration,
    pub reservation_ttl: Duration,
    pub processed_event_retention_days: u32,
    pub batch_size: u32,
}

impl Default for ReservationSweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            reservation_ttl: Duration::from_secs(900),
            processed_event_retention_days: 90,
            batch_size: 500,
        }
    }
}

impl ReservationSweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_reservation_ttl(mut self, ttl: Duration) -> Self {
        self.reservation_ttl = ttl;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.processed_event_retention_days = days;
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub released: usize,
    pub skipped: usize,
    pub pruned_events: u64,
}

/// Background service that reclaims expired reservations.
pub struct ReservationSweeper {
    gate: Arc<AccessGate>,
    reservations: Arc<dyn ReservationRepository>,
    deduplicator: Arc<dyn EventDeduplicator>,
    config: ReservationSweeperConfig,
}

impl ReservationSweeper {
    pub fn new(
        gate: Arc<AccessGate>,
        reservations: Arc<dyn ReservationRepository>,
        deduplicator: Arc<dyn EventDeduplicator>,
        config: ReservationSweeperConfig,
    ) -> Self {
        Self {
            gate,
            reservations,
            deduplicator,
            config,
        }
    }

    /// Runs sweeps until the shutdown signal flips to `true`.
    ///
    /// Store failures are logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reservation sweeper stopping");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Reservation sweep failed");
                    }
                }
            }
        }
    }

    /// Runs exactly one sweep.
    pub async fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let now = Timestamp::now();
        let cutoff = now.minus_secs(self.config.reservation_ttl.as_secs());
        let expired = self
            .reservations
            .list_expired(cutoff, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for reservation in expired {
            match self.gate.release(&reservation.id).await {
                Ok(_) => {
                    report.released += 1;
                    info!(
                        user_id = %reservation.user_id,
                        reservation_id = %reservation.id,
                        "Expired reservation reclaimed"
                    );
                }
                // Settled by its owner between listing and releasing.
                Err(AccessError::ReservationAlreadySettled { .. }) => report.skipped += 1,
                Err(AccessError::Store(e)) => return Err(e),
                Err(e) => {
                    report.skipped += 1;
                    warn!(reservation_id = %reservation.id, error = %e, "Could not reclaim reservation");
                }
            }
        }

        let retention_cutoff = now.minus_days(i64::from(self.config.processed_event_retention_days));
        report.pruned_events = self
            .deduplicator
            .delete_processed_before(retention_cutoff)
            .await?;

        debug!(
            released = report.released,
            skipped = report.skipped,
            pruned_events = report.pruned_events,
            "Reservation sweep finished"
        );
        Ok(report)
    }
}
