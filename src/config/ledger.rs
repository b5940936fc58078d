//! Ledger behaviour configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Tuning for the access gate, the metered operation and the sweeper.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// CAS attempts before a reserve reports transient contention
    #[serde(default = "default_max_cas_attempts")]
    pub max_cas_attempts: u32,

    /// Deadline for one reserve call in milliseconds
    #[serde(default = "default_reserve_timeout_ms")]
    pub reserve_timeout_ms: u64,

    /// Age after which an unsettled reservation is reclaimed
    #[serde(default = "default_reservation_ttl")]
    pub reservation_ttl_secs: u64,

    /// Time between sweeper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Days a processed event id is remembered
    #[serde(default = "default_retention_days")]
    pub processed_event_retention_days: u32,

    /// Return the credit when the analyzer fails
    #[serde(default = "default_refund_on_failure")]
    pub refund_on_failure: bool,

    /// Largest accepted upload for the metered operation
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl LedgerConfig {
    pub fn reserve_timeout(&self) -> Duration {
        Duration::from_millis(self.reserve_timeout_ms)
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate ledger configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=64).contains(&self.max_cas_attempts) {
            return Err(ValidationError::InvalidCasAttempts);
        }
        if self.reserve_timeout_ms == 0 {
            return Err(ValidationError::ZeroDuration("reserve_timeout_ms"));
        }
        if self.reservation_ttl_secs == 0 {
            return Err(ValidationError::ZeroDuration("reservation_ttl_secs"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::ZeroDuration("sweep_interval_secs"));
        }
        if self.processed_event_retention_days == 0 {
            return Err(ValidationError::ZeroDuration("processed_event_retention_days"));
        }
        if self.max_upload_bytes == 0 {
            return Err(ValidationError::InvalidUploadLimit);
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_cas_attempts: default_max_cas_attempts(),
            reserve_timeout_ms: default_reserve_timeout_ms(),
            reservation_ttl_secs: default_reservation_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            processed_event_retention_days: default_retention_days(),
            refund_on_failure: default_refund_on_failure(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_max_cas_attempts() -> u32 {
    8
}

fn default_reserve_timeout_ms() -> u64 {
    2000
}

fn default_reservation_ttl() -> u64 {
    900
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_retention_days() -> u32 {
    90
}

fn default_refund_on_failure() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.max_cas_attempts, 8);
        assert_eq!(config.reserve_timeout(), Duration::from_secs(2));
        assert_eq!(config.reservation_ttl(), Duration::from_secs(900));
        assert!(config.refund_on_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cas_attempt_bounds() {
        for attempts in [0, 65] {
            let config = LedgerConfig {
                max_cas_attempts: attempts,
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(ValidationError::InvalidCasAttempts));
        }
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        let config = LedgerConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::ZeroDuration("sweep_interval_secs"))
        );
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{"max_cas_attempts": 3, "refund_on_failure": false}"#).unwrap();
        assert_eq!(config.max_cas_attempts, 3);
        assert!(!config.refund_on_failure);
        assert_eq!(config.processed_event_retention_days, 90);
    }
}
